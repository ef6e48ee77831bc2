//! Article commands.

use super::App;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use serde::Serialize;
use session_store::ClassifyAuth;
use summarizer_api_client::{ApiError, Notice};
use tracing::info;

#[derive(Serialize)]
struct AnswerOutput<'a> {
    url: &'a str,
    question: &'a str,
    answer: String,
}

/// Summarize an article.
pub async fn summarize(
    app: &App,
    url: &str,
    instructions: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    app.start().await;
    let assistant = app.assistant()?;

    match assistant.analyze(url, instructions).await {
        Ok(summary) => {
            output::print(&summary, format, |summary| {
                if let Some(title) = &summary.title {
                    output::print_heading(title);
                }
                println!("{}", summary.summary);
            });
            Ok(())
        }
        Err(e) => {
            recover(app, &e).await;
            Err(output::report_failure(Notice::analysis_failed(&e), format))
        }
    }
}

/// Ask a question about an article.
pub async fn ask(app: &App, url: &str, question: &str, format: &OutputFormat) -> Result<()> {
    app.start().await;
    let assistant = app.assistant()?;

    match assistant.ask(url, question).await {
        Ok(answer) => {
            let result = AnswerOutput { url, question, answer };
            output::print(&result, format, |result| println!("{}", result.answer));
            Ok(())
        }
        Err(e) => {
            recover(app, &e).await;
            Err(output::report_failure(Notice::question_failed(&e), format))
        }
    }
}

/// Check that the backend is reachable.
pub async fn health(app: &App, format: &OutputFormat) -> Result<()> {
    app.start().await;
    let client = app.api_client()?;
    let health = client.health().await?;
    output::print(&health, format, |health| {
        output::print_row("Backend", client.base_url().as_str());
        output::print_row("Status", &health.status);
        if let Some(version) = &health.version {
            output::print_row("Version", version);
        }
    });
    Ok(())
}

/// Authorization failures that survived both retry layers get one recovery
/// attempt before the error is reported.
async fn recover(app: &App, err: &ApiError) {
    if !err.is_authorization() {
        return;
    }
    let outcome = app
        .context
        .recover_from_auth_error(err, app.navigator.as_ref())
        .await;
    info!(outcome = ?outcome, "Auth error recovery finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::NoticeReported;
    use summarizer_config_and_utils::{Config, Paths};

    fn app(dir: &tempfile::TempDir) -> App {
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        paths.ensure_dirs().unwrap();
        App::new(paths, Config::default()).unwrap()
    }

    #[tokio::test]
    async fn test_failed_summarize_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        let err = summarize(&app, "not a url", None, &OutputFormat::Json)
            .await
            .unwrap_err();
        app.shutdown();

        let reported = err.downcast_ref::<NoticeReported>().unwrap();
        assert_eq!(reported.0.description, "Please enter a valid URL");
    }

    #[tokio::test]
    async fn test_empty_question_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);

        let err = ask(&app, "https://example.com/a", "  ", &OutputFormat::Text)
            .await
            .unwrap_err();
        app.shutdown();

        assert!(err.downcast_ref::<NoticeReported>().is_some());
    }
}
