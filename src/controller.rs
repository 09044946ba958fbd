//! Conversation controller
//!
//! Owns the transcript, the draft text, the staged attachment and the
//! in-flight flag. A submission is split in two halves so a UI event loop can
//! run the network call elsewhere:
//!
//! 1. [`ConversationController::begin_submit`] validates, encodes the file,
//!    appends the user message and returns the request to send.
//! 2. [`ConversationController::complete`] appends the assistant message for
//!    the settled result and always clears the in-flight flag.
//!
//! [`ConversationController::submit`] chains both around the injected solver,
//! running it through [`spawn_solve`] and [`settle`] so even a panicking
//! solver ends in a settled turn.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::ai::{SolveRequest, Solver};
use crate::attachment::{self, PendingAttachment};
use crate::config::Credential;
use crate::error::{EncodingError, SolveError};
use crate::state::{Conversation, MathResponse, Message, MessageId};

/// Result of a full `submit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Nothing to send, or a request is already in flight.
    Skipped,
    Solved(MessageId),
    Failed(MessageId),
}

pub struct ConversationController {
    transcript: Conversation,
    draft_text: String,
    pending: Option<PendingAttachment>,
    is_submitting: bool,
    solver: Arc<dyn Solver>,
    credential: Credential,
}

impl ConversationController {
    pub fn new(solver: Arc<dyn Solver>, credential: Credential) -> Self {
        Self {
            transcript: Conversation::new(),
            draft_text: String::new(),
            pending: None,
            is_submitting: false,
            solver,
            credential,
        }
    }

    pub fn transcript(&self) -> &Conversation {
        &self.transcript
    }

    pub fn draft(&self) -> &str {
        &self.draft_text
    }

    pub fn draft_mut(&mut self) -> &mut String {
        &mut self.draft_text
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft_text = text.into();
    }

    pub fn pending(&self) -> Option<&PendingAttachment> {
        self.pending.as_ref()
    }

    pub fn is_submitting(&self) -> bool {
        self.is_submitting
    }

    pub fn solver(&self) -> Arc<dyn Solver> {
        Arc::clone(&self.solver)
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Whether a submit would do anything right now.
    pub fn can_submit(&self) -> bool {
        !self.is_submitting && (!self.draft_text.trim().is_empty() || self.pending.is_some())
    }

    /// Stage a file for the next submission, replacing any staged one.
    pub fn select_file(&mut self, path: impl Into<PathBuf>) {
        let pending = PendingAttachment::select(path);
        tracing::debug!(file = %pending.file_name, mime = %pending.mime_type, "attachment staged");
        self.pending = Some(pending);
    }

    pub fn clear_file(&mut self) {
        self.pending = None;
    }

    /// Validate, encode and append the user message.
    ///
    /// Returns `Ok(None)` when there is nothing to send or a request is
    /// already in flight. An encoding failure leaves every field untouched.
    pub async fn begin_submit(&mut self) -> Result<Option<SolveRequest>, EncodingError> {
        if !self.can_submit() {
            return Ok(None);
        }

        let encoded = match &self.pending {
            Some(pending) => Some(attachment::encode(pending).await?),
            None => None,
        };

        let text = std::mem::take(&mut self.draft_text);
        self.pending = None;

        let snapshot = encoded.as_ref().map(|file| file.snapshot());
        let request = SolveRequest::new(&text, encoded, self.credential.clone());
        let id = self.transcript.push(Message::user(text, snapshot));
        self.is_submitting = true;

        tracing::info!(
            message = %id,
            has_attachment = request.attachment.is_some(),
            "question submitted"
        );

        Ok(Some(request))
    }

    /// Append the assistant message for a settled solve call.
    pub fn complete(&mut self, outcome: Result<MathResponse, SolveError>) -> Option<MessageId> {
        if !self.is_submitting {
            tracing::debug!("ignoring solve result with no request in flight");
            return None;
        }

        let message = match outcome {
            Ok(data) => Message::solved(data),
            Err(err) => {
                tracing::warn!(error = %err, "solve request failed");
                Message::failed()
            }
        };
        let id = self.transcript.push(message);
        self.is_submitting = false;
        Some(id)
    }

    /// Run one full submit cycle against the injected solver.
    pub async fn submit(&mut self) -> Result<SubmitOutcome, EncodingError> {
        let Some(request) = self.begin_submit().await? else {
            return Ok(SubmitOutcome::Skipped);
        };

        let outcome = settle(spawn_solve(self.solver(), request)).await;
        let solved = outcome.is_ok();

        Ok(match self.complete(outcome) {
            Some(id) if solved => SubmitOutcome::Solved(id),
            Some(id) => SubmitOutcome::Failed(id),
            None => SubmitOutcome::Skipped,
        })
    }
}

/// Run a solve call on its own task so a panic cannot strand the turn.
pub fn spawn_solve(
    solver: Arc<dyn Solver>,
    request: SolveRequest,
) -> JoinHandle<Result<MathResponse, SolveError>> {
    tokio::spawn(async move { solver.solve(&request).await })
}

/// Wait for a spawned solve call. A panicked or aborted task settles as a
/// `Request` error.
pub async fn settle(task: JoinHandle<Result<MathResponse, SolveError>>) -> Result<MathResponse, SolveError> {
    match task.await {
        Ok(outcome) => outcome,
        Err(err) => Err(SolveError::Request(format!("solve task ended: {}", err))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ai::FALLBACK_PROMPT;
    use crate::state::{Role, FAILED_REPLY_TEXT};
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::Mutex;

    /// Fake solver that records every request and replays a fixed result.
    pub(crate) struct RecordingSolver {
        pub requests: Mutex<Vec<SolveRequest>>,
        result: fn() -> Result<MathResponse, SolveError>,
    }

    impl RecordingSolver {
        pub fn new(result: fn() -> Result<MathResponse, SolveError>) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                result,
            })
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Solver for RecordingSolver {
        async fn solve(&self, request: &SolveRequest) -> Result<MathResponse, SolveError> {
            self.requests.lock().unwrap().push(request.clone());
            (self.result)()
        }

        fn model_id(&self) -> &str {
            "recording"
        }
    }

    pub(crate) fn quadratic_answer() -> Result<MathResponse, SolveError> {
        Ok(MathResponse {
            theory: "Phương trình bậc hai $ax^2 + bx + c = 0$ có $\\Delta = b^2 - 4ac$.".to_string(),
            hint: "Tính $\\Delta$ rồi áp dụng công thức nghiệm.".to_string(),
            solution: "$\\Delta = 1$, nên $x_1 = 2$, $x_2 = 3$.".to_string(),
        })
    }

    fn network_down() -> Result<MathResponse, SolveError> {
        Err(SolveError::Request("connection refused".to_string()))
    }

    fn solver_crash() -> Result<MathResponse, SolveError> {
        panic!("solver crashed")
    }

    fn missing_hint() -> Result<MathResponse, SolveError> {
        crate::ai::parse_structured_response(r#"{"theory":"t","solution":"s"}"#)
    }

    fn controller(solver: Arc<RecordingSolver>) -> ConversationController {
        ConversationController::new(solver, Credential::Present("test-key".to_string()))
    }

    fn image_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(&[0x89, b'P', b'N', b'G']).unwrap();
        file
    }

    #[tokio::test]
    async fn test_empty_submit_is_noop() {
        let solver = RecordingSolver::new(quadratic_answer);
        let mut ctrl = controller(solver.clone());
        ctrl.set_draft("   \n\t");

        assert_eq!(ctrl.submit().await.unwrap(), SubmitOutcome::Skipped);
        assert!(ctrl.transcript().is_empty());
        assert_eq!(solver.calls(), 0);
        assert_eq!(ctrl.draft(), "   \n\t");
    }

    #[tokio::test]
    async fn test_submit_while_in_flight_is_noop() {
        let solver = RecordingSolver::new(quadratic_answer);
        let mut ctrl = controller(solver.clone());

        ctrl.set_draft("câu 1");
        let first = ctrl.begin_submit().await.unwrap();
        assert!(first.is_some());
        assert!(ctrl.is_submitting());

        ctrl.set_draft("câu 2");
        assert!(ctrl.begin_submit().await.unwrap().is_none());
        assert_eq!(ctrl.submit().await.unwrap(), SubmitOutcome::Skipped);
        assert_eq!(ctrl.transcript().len(), 1);
        assert_eq!(ctrl.draft(), "câu 2");
        assert_eq!(solver.calls(), 0);
    }

    #[tokio::test]
    async fn test_text_question_appends_user_then_answer() {
        let solver = RecordingSolver::new(quadratic_answer);
        let mut ctrl = controller(solver.clone());
        ctrl.set_draft("Giải phương trình: x^2 - 5x + 6 = 0");

        let outcome = ctrl.submit().await.unwrap();

        let transcript = ctrl.transcript();
        assert_eq!(transcript.len(), 2);
        let user = transcript.get(0).unwrap();
        assert_eq!(user.role(), Role::User);
        assert_eq!(user.text(), Some("Giải phương trình: x^2 - 5x + 6 = 0"));
        assert!(user.attachment().is_none());

        let answer = transcript.get(1).unwrap();
        assert_eq!(outcome, SubmitOutcome::Solved(answer.id));
        let data = answer.data().unwrap();
        assert!(!data.theory.is_empty());
        assert!(!data.hint.is_empty());
        assert!(!data.solution.is_empty());

        assert!(ctrl.draft().is_empty());
        assert!(!ctrl.is_submitting());

        let requests = solver.requests.lock().unwrap();
        assert_eq!(requests[0].prompt, "Giải phương trình: x^2 - 5x + 6 = 0");
        assert!(requests[0].attachment.is_none());
        assert_eq!(requests[0].credential.as_deref(), Some("test-key"));
    }

    #[tokio::test]
    async fn test_image_without_text_uses_fallback_prompt() {
        let file = image_file();
        let solver = RecordingSolver::new(quadratic_answer);
        let mut ctrl = controller(solver.clone());
        ctrl.select_file(file.path());

        ctrl.submit().await.unwrap();

        let user = ctrl.transcript().get(0).unwrap();
        let snapshot = user.attachment().unwrap();
        assert!(snapshot.is_image());
        assert_eq!(snapshot.mime_type, "image/png");
        assert_eq!(snapshot.preview.as_deref(), Some("iVBORw=="));
        assert_eq!(
            snapshot.file_name,
            file.path().file_name().unwrap().to_string_lossy()
        );
        assert!(ctrl.pending().is_none());

        let requests = solver.requests.lock().unwrap();
        assert_eq!(requests[0].prompt, FALLBACK_PROMPT);
        let sent = requests[0].attachment.as_ref().unwrap();
        assert_eq!(sent.data, "iVBORw==");
        assert_eq!(sent.mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_failed_solve_appends_error_turn() {
        let solver = RecordingSolver::new(network_down);
        let mut ctrl = controller(solver);
        ctrl.set_draft("1 + 1");

        let outcome = ctrl.submit().await.unwrap();

        assert_eq!(ctrl.transcript().len(), 2);
        let reply = ctrl.transcript().last().unwrap();
        assert_eq!(outcome, SubmitOutcome::Failed(reply.id));
        assert!(reply.is_error());
        assert!(reply.data().is_none());
        assert!(!FAILED_REPLY_TEXT.is_empty());
        assert!(!ctrl.is_submitting());
    }

    #[tokio::test]
    async fn test_missing_field_is_failed_turn() {
        let solver = RecordingSolver::new(missing_hint);
        let mut ctrl = controller(solver);
        ctrl.set_draft("tính diện tích");

        ctrl.submit().await.unwrap();

        let reply = ctrl.transcript().last().unwrap();
        assert!(reply.is_error());
        assert!(reply.data().is_none());
    }

    #[tokio::test]
    async fn test_cleared_file_is_not_sent() {
        let file = image_file();
        let solver = RecordingSolver::new(quadratic_answer);
        let mut ctrl = controller(solver.clone());

        ctrl.select_file(file.path());
        ctrl.clear_file();
        assert!(ctrl.pending().is_none());

        ctrl.set_draft("chỉ có chữ");
        ctrl.submit().await.unwrap();

        assert!(ctrl.transcript().get(0).unwrap().attachment().is_none());
        assert!(solver.requests.lock().unwrap()[0].attachment.is_none());
    }

    #[tokio::test]
    async fn test_encoding_failure_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let solver = RecordingSolver::new(quadratic_answer);
        let mut ctrl = controller(solver.clone());
        ctrl.set_draft("xem ảnh");
        ctrl.select_file(dir.path().join("gone.png"));

        assert!(ctrl.submit().await.is_err());

        assert!(ctrl.transcript().is_empty());
        assert_eq!(ctrl.draft(), "xem ảnh");
        assert!(ctrl.pending().is_some());
        assert!(!ctrl.is_submitting());
        assert_eq!(solver.calls(), 0);
    }

    #[tokio::test]
    async fn test_select_replaces_staged_file() {
        let solver = RecordingSolver::new(quadratic_answer);
        let mut ctrl = controller(solver);
        ctrl.select_file("a.png");
        ctrl.select_file("b.pdf");
        assert_eq!(ctrl.pending().map(|p| p.file_name.as_str()), Some("b.pdf"));
    }

    #[tokio::test]
    async fn test_missing_credential_is_failed_turn() {
        let client = Arc::new(crate::ai::GeminiClient::new("http://127.0.0.1:9", "gemini-2.5-flash"));
        let mut ctrl = ConversationController::new(client, Credential::Absent);
        ctrl.set_draft("2 + 2");

        let outcome = ctrl.submit().await.unwrap();

        assert!(matches!(outcome, SubmitOutcome::Failed(_)));
        assert_eq!(ctrl.transcript().len(), 2);
        assert!(!ctrl.is_submitting());
    }

    #[test]
    fn test_complete_without_request_is_ignored() {
        let solver = RecordingSolver::new(quadratic_answer);
        let mut ctrl = controller(solver);
        assert!(ctrl.complete(quadratic_answer()).is_none());
        assert!(ctrl.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_solver_still_settles_turn() {
        let solver = RecordingSolver::new(solver_crash);
        let mut ctrl = controller(solver.clone());
        ctrl.set_draft("2 + 2");

        let outcome = ctrl.submit().await.unwrap();

        assert!(matches!(outcome, SubmitOutcome::Failed(_)));
        assert!(!ctrl.is_submitting());
        assert_eq!(ctrl.transcript().len(), 2);
        assert!(ctrl.transcript().last().unwrap().is_error());

        // The controller accepts the next question
        ctrl.set_draft("3 + 3");
        assert!(ctrl.begin_submit().await.unwrap().is_some());
        assert_eq!(solver.calls(), 1);
    }

    #[tokio::test]
    async fn test_settle_maps_aborted_task_to_request_error() {
        let task = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            quadratic_answer()
        });
        task.abort();

        assert!(matches!(settle(task).await, Err(SolveError::Request(_))));
    }
}
