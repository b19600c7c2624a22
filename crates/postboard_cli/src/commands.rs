//! Command dispatch over one `AppContext`.

use crate::cli::{Cli, Commands, CredentialArgs};
use anyhow::{anyhow, bail, Context, Result};
use log::warn;
use postboard_core::{
    default_log_level, init_logging, AppContext, ArticleId, BackendConfig, DisplayArticle,
    ImageUpload, NavigationDecision, RecordSource, SessionFile, SignUpStatus,
};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "postboard";

pub fn run(cli: Cli) -> Result<()> {
    init_cli_logging(&cli);

    let config = BackendConfig::from_env().context("cannot start without backend configuration")?;
    let session_file = session_file_path(&cli).map(SessionFile::new);
    let record_source = record_source_for(&cli)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async {
        let app = AppContext::connect(&config, session_file, record_source)
            .context("failed to open local article database")?;
        app.initialize().await;
        let result = dispatch(&app, cli.command).await;
        app.shutdown();
        result
    })
}

async fn dispatch(app: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::Signup(credentials) => signup(app, &credentials).await,
        Commands::Login(credentials) => login(app, &credentials).await,
        Commands::Logout => {
            app.session.sign_out().await.context("sign-out failed")?;
            println!("Signed out.");
            Ok(())
        }
        Commands::Whoami => {
            match app.session.current_identity() {
                Some(identity) => println!(
                    "{} ({})",
                    identity.email.as_deref().unwrap_or("no email"),
                    identity.id
                ),
                None => println!("Not signed in."),
            }
            Ok(())
        }
        Commands::List => list(app).await,
        Commands::Post { content, image } => post(app, content, image.as_deref()).await,
        Commands::Edit { id, content } => {
            let article = app
                .articles
                .update(id, content)
                .await
                .with_context(|| format!("could not update article {id}"))?;
            println!("Updated {}", article.id());
            Ok(())
        }
        Commands::Delete { id } => delete(app, id).await,
        Commands::Open { path } => {
            match app.guard.before_each(&path).await {
                NavigationDecision::Proceed => println!("proceed {path}"),
                redirect => println!(
                    "redirect {}",
                    redirect.location().unwrap_or_else(|| "/".to_string())
                ),
            }
            Ok(())
        }
    }
}

async fn signup(app: &AppContext, credentials: &CredentialArgs) -> Result<()> {
    let status = app
        .session
        .sign_up(&credentials.email, &credentials.password)
        .await
        .context("sign-up failed")?;
    match status {
        SignUpStatus::SignedIn => println!("Account created; signed in as {}.", credentials.email),
        SignUpStatus::ConfirmationRequired => {
            println!("Account created; confirm your email address before signing in.")
        }
    }
    Ok(())
}

async fn login(app: &AppContext, credentials: &CredentialArgs) -> Result<()> {
    let identity = app
        .session
        .sign_in(&credentials.email, &credentials.password)
        .await
        .context("sign-in failed")?;
    // A restored session for another user stays visible until the sign-in
    // event lands.
    let snapshot = app
        .session
        .wait_for_identity(&identity)
        .await
        .ok_or_else(|| anyhow!("session store stopped before sign-in completed"))?;
    let email = snapshot
        .identity
        .and_then(|identity| identity.email)
        .unwrap_or_else(|| credentials.email.clone());
    println!("Signed in as {email}.");
    Ok(())
}

async fn list(app: &AppContext) -> Result<()> {
    app.articles
        .fetch_all()
        .await
        .context("could not load articles")?;
    let articles = app.articles.articles();
    if articles.is_empty() {
        println!("No articles yet.");
        return Ok(());
    }
    for article in &articles {
        print_article(article, app.articles.is_owner(article));
    }
    Ok(())
}

async fn post(app: &AppContext, content: String, image: Option<&Path>) -> Result<()> {
    let image = image.map(read_image).transpose()?;
    let article = app
        .articles
        .create(content, image)
        .await
        .context("could not publish article")?;
    println!("Posted {}", article.id());
    Ok(())
}

async fn delete(app: &AppContext, id: ArticleId) -> Result<()> {
    app.articles
        .fetch_all()
        .await
        .context("could not load articles")?;
    let article = app
        .articles
        .articles()
        .into_iter()
        .find(|article| article.id() == id)
        .ok_or_else(|| anyhow!("article {id} not found"))?;
    if !app.articles.is_owner(&article) {
        bail!("article {id} belongs to {}", article.author_label);
    }

    app.articles
        .delete(id, article.article.image_url.as_deref())
        .await
        .with_context(|| format!("could not delete article {id}"))?;
    println!("Deleted {id}");
    Ok(())
}

fn print_article(article: &DisplayArticle, owned: bool) {
    let marker = if owned { " (yours)" } else { "" };
    println!(
        "{}  {}{}  {}",
        article.id(),
        article.author_label,
        marker,
        article.article.created_at.format("%Y-%m-%d %H:%M")
    );
    println!("    {}", article.article.content);
    if let Some(url) = article.article.image_url.as_deref() {
        println!("    image: {url}");
    }
}

fn read_image(path: &Path) -> Result<ImageUpload> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read image `{}`", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let upload = ImageUpload::new(file_name, bytes);
    Ok(match image_content_type(&upload.extension()) {
        Some(content_type) => upload.with_content_type(content_type),
        None => upload,
    })
}

fn image_content_type(extension: &str) -> Option<&'static str> {
    match extension {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// File logging is best effort for the CLI; failures go to stderr.
fn init_cli_logging(cli: &Cli) {
    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    let Some(log_dir) = cli
        .log_dir
        .clone()
        .or_else(|| dirs::data_local_dir().map(|dir| dir.join(APP_DIR).join("logs")))
    else {
        eprintln!("warning: no log directory available; logging disabled");
        return;
    };
    if let Err(err) = init_logging(level, &log_dir) {
        eprintln!("warning: {err}");
    }
}

fn record_source_for(cli: &Cli) -> Result<RecordSource> {
    let Some(path) = cli.local_db.clone() else {
        return Ok(RecordSource::Hosted);
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create `{}`", parent.display()))?;
    }
    Ok(RecordSource::LocalDb(path))
}

fn session_file_path(cli: &Cli) -> Option<PathBuf> {
    let path = cli
        .session_file
        .clone()
        .or_else(|| dirs::config_dir().map(|dir| dir.join(APP_DIR).join("session.json")));
    if path.is_none() {
        warn!("event=session_file module=cli status=disabled reason=no_config_dir");
    }
    path
}
