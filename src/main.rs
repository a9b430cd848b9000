use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use formkit::{
    aggregation::{aggregate, QuestionReport},
    api::{fetch_all_responses, FormsBackend, HttpBackend},
    auth::LoginCredentials,
    build_http_backend,
    builder::FormBuilder,
    config::{ClientConfig, DEFAULT_API_URL},
    error::SubmitError,
    events::{ClientEvent, EventBus, EventEnvelope},
    export::{export_file_name, export_responses_csv},
    local::LocalBackend,
    models::{share_link, AnswerValue},
    session::AnswerSession,
};
use qrcode::{render::unicode, QrCode};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::warn;
use tracing_subscriber::EnvFilter;

const PAGE_SIZE: usize = 100;

#[derive(Parser)]
#[command(name = "formkit")]
#[command(version)]
#[command(about = "Form builder and response tooling", long_about = None)]
struct Cli {
    /// Forms API base URL
    #[arg(long, env = "FORMKIT_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Bearer token for authenticated calls
    #[arg(long, env = "FORMKIT_API_TOKEN")]
    token: Option<String>,

    /// Work against a local JSON data file instead of the API
    #[arg(long, env = "FORMKIT_DATA_FILE")]
    data_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print the access token
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "FORMKIT_PASSWORD")]
        password: String,
    },
    /// List the questions of a form in order
    Questions { form_id: String },
    /// Per-question statistics over all responses
    Stats { form_id: String },
    /// Export responses as CSV
    Export {
        form_id: String,
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Move a question (1-based positions) and save the new order
    Reorder {
        form_id: String,
        from: usize,
        to: usize,
    },
    /// Submit a response, one `--answer <question_id>=<value>` per question
    Submit {
        form_id: String,
        #[arg(long = "answer", short = 'a', value_parser = parse_answer)]
        answers: Vec<(String, String)>,
    },
    /// Print the public link of a form with a QR code
    Share { form_id: String },
}

fn parse_answer(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(id, value)| (id.trim().to_string(), value.to_string()))
        .filter(|(id, _)| !id.is_empty())
        .ok_or_else(|| format!("expected <question_id>=<value>, got `{raw}`"))
}

enum Backend {
    Http(HttpBackend),
    Local(LocalBackend),
}

impl Backend {
    fn forms(&self) -> &dyn FormsBackend {
        match self {
            Backend::Http(b) => b,
            Backend::Local(b) => b,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();
    let defaults = ClientConfig::from_env();
    let token = cli.token.clone().or_else(|| defaults.token.clone());
    let config = defaults.with_base_url(cli.api_url.clone()).with_token(token);

    let events = EventBus::default();
    let mut rx = events.subscribe();

    let backend = match &cli.data_file {
        Some(path) => Backend::Local(LocalBackend::open(path)?),
        None => Backend::Http(build_http_backend(&config, events.clone())?),
    };

    if let Backend::Http(http) = &backend {
        let tokens = http.session().tokens();
        if tokens.token().await.is_some() && !tokens.is_valid(chrono::Utc::now()).await {
            warn!("configured token is expired, continuing without it");
            tokens.clear().await;
        }
    }

    let result = run(cli.command, &backend, &config, &events).await;
    drain_events(&mut rx);
    result
}

async fn run(
    command: Commands,
    backend: &Backend,
    config: &ClientConfig,
    events: &EventBus,
) -> anyhow::Result<()> {
    let forms = backend.forms();
    match command {
        Commands::Login { username, password } => {
            let Backend::Http(http) = backend else {
                bail!("login needs the HTTP backend");
            };
            let token = http
                .login(&LoginCredentials { username, password })
                .await
                .map_err(|e| notify(events, e))?;
            println!("{}", token.access_token);
        }
        Commands::Questions { form_id } => {
            let form = forms
                .fetch_form(&form_id)
                .await
                .map_err(|e| notify(events, e))?;
            println!("{} ({:?})", form.form.title, form.form.status());
            let mut questions = form.questions;
            questions.sort_by_key(|q| q.order);
            for q in &questions {
                let marker = if q.is_required { " *" } else { "" };
                println!(
                    "{:>3}. [{}] {}{}  ({})",
                    q.order + 1,
                    q.question_type.metadata().label,
                    q.title,
                    marker,
                    q.id
                );
            }
        }
        Commands::Stats { form_id } => {
            let form = forms
                .fetch_form(&form_id)
                .await
                .map_err(|e| notify(events, e))?;
            let responses = fetch_all_responses(forms, &form_id, PAGE_SIZE)
                .await
                .map_err(|e| notify(events, e))?;
            println!("{}: {} réponse(s)", form.form.title, responses.len());
            for q in &form.questions {
                let summary = aggregate(q, &responses);
                println!("\n{} ({} réponse(s))", q.title, summary.total_responses);
                match summary.report {
                    QuestionReport::Choice { options } => {
                        for o in options {
                            println!("  {:<30} {:>4}  {:>3}%", o.option, o.count, o.percentage);
                        }
                    }
                    QuestionReport::Numeric(n) => {
                        println!("  min {}  moyenne {}  max {}", n.min, n.avg, n.max);
                    }
                    QuestionReport::Text { answers } => {
                        for a in answers {
                            println!("  - {a}");
                        }
                    }
                    QuestionReport::Date { distribution } => {
                        for (day, count) in distribution {
                            println!("  {day}  {count}");
                        }
                    }
                }
            }
        }
        Commands::Export { form_id, out } => {
            let form = forms
                .fetch_form(&form_id)
                .await
                .map_err(|e| notify(events, e))?;
            let responses = fetch_all_responses(forms, &form_id, PAGE_SIZE)
                .await
                .map_err(|e| notify(events, e))?;
            if responses.is_empty() {
                println!("Aucune réponse à exporter.");
                return Ok(());
            }
            let csv = export_responses_csv(&responses);
            let path = out.unwrap_or_else(|| {
                PathBuf::from(export_file_name(
                    &form.form.title,
                    chrono::Local::now().date_naive(),
                ))
            });
            tokio::fs::write(&path, csv)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!("{} réponse(s) exportée(s) vers {}", responses.len(), path.display());
        }
        Commands::Reorder { form_id, from, to } => {
            if from == 0 || to == 0 {
                bail!("positions start at 1");
            }
            let mut builder = FormBuilder::new(Some(form_id), events.clone());
            builder.load(forms).await?;
            builder.drop_and_persist(forms, from - 1, to - 1).await?;
            for q in builder.questions() {
                println!("{:>3}. {}", q.order + 1, q.title);
            }
        }
        Commands::Submit { form_id, answers } => {
            let form = forms
                .fetch_form(&form_id)
                .await
                .map_err(|e| notify(events, e))?;
            let mut session = AnswerSession::new(form.form, form.questions, events.clone());
            for (question_id, raw) in answers {
                let question_type = session
                    .questions()
                    .iter()
                    .find(|q| q.id.to_string() == question_id)
                    .map(|q| q.question_type)
                    .with_context(|| format!("question {question_id} is not part of this form"))?;
                let draft = session.set_answer(&question_id, AnswerValue::parse_input(question_type, &raw))?;
                if let Some(msg) = &draft.error_message {
                    eprintln!("{question_id}: {msg}");
                }
            }
            let progress = session.progress();
            println!("{}/{} ({}%)", progress.answered, progress.total, progress.percent);
            match session.submit(forms).await {
                Ok(stored) => println!("Réponse enregistrée: {}", stored.id),
                Err(SubmitError::Invalid(issues)) => {
                    for issue in &issues {
                        eprintln!("{}: {}", issue.field, issue.issue);
                    }
                    bail!("{} réponse(s) invalide(s)", issues.len());
                }
                Err(err) => return Err(err.into()),
            }
        }
        Commands::Share { form_id } => {
            let link = share_link(&config.public_url, &form_id);
            let code = QrCode::new(link.as_bytes())
                .map_err(|e| anyhow::anyhow!("cannot encode {link} as QR: {e:?}"))?;
            let image = code
                .render::<unicode::Dense1x2>()
                .dark_color(unicode::Dense1x2::Light)
                .light_color(unicode::Dense1x2::Dark)
                .build();
            println!("{link}\n{image}");
        }
    }
    Ok(())
}

fn notify(events: &EventBus, err: formkit::error::ApiError) -> formkit::error::ApiError {
    events.notify_api_error(&err);
    err
}

fn drain_events(rx: &mut broadcast::Receiver<EventEnvelope>) {
    while let Ok(envelope) = rx.try_recv() {
        match envelope.event {
            ClientEvent::Notification {
                level,
                title,
                message,
            } => match title {
                Some(title) => eprintln!("[{level:?}] {title}: {message}"),
                None => eprintln!("[{level:?}] {message}"),
            },
            ClientEvent::SessionExpired { .. } => {
                eprintln!("Session expirée. Reconnectez-vous avec `formkit login`.");
            }
        }
    }
}
