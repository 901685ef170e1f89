use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use scribeline_languages::AUTO_DETECT;

use scribeline_lib::clients::{ApiError, Credentials, HttpServiceClient, JobKind, JobRequest, OutputFormat};
use scribeline_lib::config::{load_core_config, save_core_config, CoreConfig, JsonFileStore};
use scribeline_lib::keychain;
use scribeline_lib::orchestrator::{Orchestrator, PassthroughMedia};
use scribeline_lib::session::KeychainTokenCache;
use scribeline_lib::Error;

#[derive(Parser)]
#[command(name = "scribeline", version, about = "Transcribe and translate media files")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "SCRIBELINE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and remember the account in the system keychain
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "SCRIBELINE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the session and the stored account
    Logout,
    /// Show the remaining credits
    Credits,
    /// List languages for a job kind (transcription, translation, language_detection)
    Languages {
        kind: JobKind,
        /// Only languages this provider supports
        #[arg(long)]
        provider: Option<String>,
    },
    /// Transcribe a media file; the language is detected unless given
    Transcribe {
        file: PathBuf,
        #[arg(long, default_value = AUTO_DETECT)]
        language: String,
        #[arg(long)]
        provider: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value = "srt")]
        format: OutputFormat,
    },
    /// Transcribe a media file and translate the transcript
    Translate {
        file: PathBuf,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        provider: String,
    },
    /// Detect the spoken language
    Detect {
        file: PathBuf,
        #[arg(long)]
        provider: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    scribeline_lib::log::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("scribeline"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.json")
}

async fn run(cli: Cli) -> Result<(), Error> {
    let store = JsonFileStore::open(cli.config.unwrap_or_else(default_config_path))?;
    let mut config = load_core_config(&store);

    let api = Arc::new(HttpServiceClient::from_config(&config)?);
    let orchestrator = Orchestrator::new(
        &config,
        api,
        Arc::new(KeychainTokenCache::new()?),
        Arc::new(PassthroughMedia),
    );

    match cli.command {
        Command::Login { username, password } => {
            let credentials = Credentials::new(username.clone(), password);
            orchestrator.login(credentials.clone()).await?;
            if let Err(e) = keychain::save_credentials(&credentials) {
                warn!("Account not remembered: {}", e);
            }
            config.username = Some(username.clone());
            save_core_config(&store, &config)?;

            println!("Logged in as {}", username);
            if let Some(credits) = orchestrator.state().credits {
                println!("{}", format_credits(credits.credits, credits.unit.as_deref()));
            }
        }
        Command::Logout => {
            orchestrator.logout();
            if let Err(e) = keychain::delete_credentials() {
                warn!("Stored account not removed: {}", e);
            }
            config.username = None;
            save_core_config(&store, &config)?;
            println!("Logged out");
        }
        Command::Credits => {
            restore(&orchestrator, &config).await?;
            let credits = orchestrator.refresh_credits().await?;
            println!("{}", format_credits(credits.credits, credits.unit.as_deref()));
        }
        Command::Languages { kind, provider } => {
            restore(&orchestrator, &config).await?;
            let catalog = orchestrator.languages(kind).await?;
            for language in catalog.sorted_by_name() {
                if let Some(provider) = &provider {
                    if !catalog.supports(&language.canonical_id, provider) {
                        continue;
                    }
                }
                let providers: Vec<&str> = catalog
                    .providers_for(&language.canonical_id)
                    .map(|p| p.iter().map(String::as_str).collect())
                    .unwrap_or_default();
                println!(
                    "{:<14} {:<28} {}",
                    language.canonical_id,
                    language.display_name,
                    providers.join(", ")
                );
            }
        }
        Command::Transcribe {
            file,
            language,
            provider,
            model,
            format,
        } => {
            restore(&orchestrator, &config).await?;
            let mut request =
                JobRequest::transcription(file, language, provider).with_output_format(format);
            if let Some(model) = model {
                request = request.with_model(model);
            }
            run_job(&orchestrator, request).await?;
        }
        Command::Translate {
            file,
            from,
            to,
            provider,
        } => {
            restore(&orchestrator, &config).await?;
            run_job(&orchestrator, JobRequest::translation(file, from, to, provider)).await?;
        }
        Command::Detect { file, provider } => {
            restore(&orchestrator, &config).await?;
            run_job(&orchestrator, JobRequest::language_detection(file, provider)).await?;
        }
    }

    Ok(())
}

/// Reuse the cached session or log in with the account stored in the keychain
async fn restore(orchestrator: &Orchestrator, config: &CoreConfig) -> Result<(), Error> {
    let credentials = match keychain::load_credentials() {
        Ok(credentials) => credentials,
        Err(e) => {
            warn!("Could not read stored account: {}", e);
            None
        }
    };
    if credentials.is_none() {
        info!(
            "No stored account{}",
            config
                .username
                .as_deref()
                .map(|u| format!(" for '{}'", u))
                .unwrap_or_default()
        );
    }

    if !orchestrator.restore_session(credentials).await? {
        return Err(ApiError::authentication("Not logged in. Run `scribeline login` first.").into());
    }
    Ok(())
}

async fn run_job(orchestrator: &Orchestrator, request: JobRequest) -> Result<(), Error> {
    let kind = request.kind;
    let handle = orchestrator.submit(request)?;
    let id = handle.id();

    let interrupt = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling job {}", id);
                orchestrator.cancel(id);
            }
        }
    });
    let outcome = handle.outcome().await;
    interrupt.abort();
    let result = outcome?;

    match (kind, result.detected_language(), result.url()) {
        (JobKind::LanguageDetection, Some(language), _) => println!("{}", language),
        (_, _, Some(url)) => println!("{}", url),
        _ => println!("{}", result.data),
    }
    Ok(())
}

fn format_credits(credits: f64, unit: Option<&str>) -> String {
    match unit {
        Some(unit) => format!("{} {} remaining", credits, unit),
        None => format!("{} credits remaining", credits),
    }
}
