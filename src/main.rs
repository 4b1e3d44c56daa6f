use certpath::collaborators::mock::{MockCatalog, MockNotifier, MockOracle, MockVerifier, ScriptedHuman};
use certpath::config::Config;
use certpath::logging;
use certpath::workflow::SessionWorkflow;

/// Offline demonstration run: mock collaborators, a scripted student
/// answering confidently, one full pipeline to a terminal phase.
#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = logging::init_tracing(&config.log_level);

    let certification_uid = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "certification.azure-administrator".to_string());

    let mut workflow = SessionWorkflow::new(
        config,
        MockOracle::new(),
        MockVerifier::passing(),
        MockCatalog::with_default_outline(),
        MockNotifier::new(),
        ScriptedHuman::always_right(0.85),
        &certification_uid,
        Some("student@example.com".to_string()),
    );

    match workflow.run_full_pipeline().await {
        Ok(phase) => {
            let state = workflow.state();
            tracing::info!(
                session = %state.session_id,
                ?phase,
                iterations = state.iteration,
                final_score = ?state.final_score,
                verifications = state.verification_log.len(),
                "session finished"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "session could not run");
            std::process::exit(1);
        }
    }
}
