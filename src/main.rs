use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use math_tutor::{
    build_solver, Config, ConversationController, OllamaClient, Provider, ResponseRenderer, Settings,
    TypesetEngine, UnicodeTypesetter,
};
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "math-tutor")]
#[command(version, about = "Terminal math homework tutor backed by an LLM")]
struct Cli {
    /// Solver backend: gemini or ollama
    #[arg(short, long)]
    provider: Option<String>,
    /// Model id, e.g. gemini-2.5-flash
    #[arg(short, long)]
    model: Option<String>,
    /// Write logs to this file (also MATH_TUTOR_LOG)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = cli
        .log_file
        .or_else(|| std::env::var_os("MATH_TUTOR_LOG").map(PathBuf::from));
    if let Some(path) = &log_file {
        init_logging(path)?;
    }

    let provider = cli
        .provider
        .as_deref()
        .map(|name| Provider::parse(name).ok_or_else(|| anyhow!("Unknown provider: {}", name)))
        .transpose()?;

    let config = Config::load()?;
    let settings = config.resolve(provider, cli.model, Config::env_api_key());
    tracing::info!(
        provider = settings.provider.as_str(),
        model = %settings.model,
        credential = ?settings.credential,
        "starting"
    );

    let solver = build_solver(&settings);
    let controller = ConversationController::new(solver, settings.credential.clone());

    // The typesetter comes up after the first frame
    let engine = TypesetEngine::pending();
    let renderer = ResponseRenderer::new(engine.clone());
    tokio::spawn(async move {
        engine.install(UnicodeTypesetter::new());
        tracing::debug!("typesetter ready");
    });

    let mut app = App::new(controller, renderer, settings.provider, settings.model.clone());
    app.alert = check_backend(&settings).await;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, &mut app).await;
    tui::restore()?;

    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App) -> Result<()> {
    let mut events = EventHandler::new();
    let tx = events.sender();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event, &tx).await?,
            None => break,
        }
    }

    app.quit();
    Ok(())
}

fn init_logging(path: &Path) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let file = std::fs::File::create(path)
        .with_context(|| format!("creating log file {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("math_tutor=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

/// Warn up front about a backend that cannot answer, shown as the first alert.
async fn check_backend(settings: &Settings) -> Option<String> {
    match settings.provider {
        Provider::Gemini if !settings.credential.is_present() => {
            Some("Chưa có API key. Đặt GEMINI_API_KEY hoặc API_KEY rồi chạy lại.".to_string())
        }
        Provider::Gemini => None,
        Provider::Ollama => {
            let ollama = OllamaClient::new(&settings.base_url, &settings.model);
            match ollama.list_models().await {
                Ok(models) if models.iter().any(|m| m == &settings.model) => None,
                Ok(_) => Some(format!(
                    "Chưa có model {}. Tải về bằng: ollama pull {}",
                    settings.model, settings.model
                )),
                Err(err) => {
                    tracing::warn!(error = %err, "could not reach Ollama");
                    Some("Không kết nối được Ollama. Hãy chạy: ollama serve".to_string())
                }
            }
        }
    }
}
