use std::sync::Arc;
use std::sync::atomic::Ordering;

use dripmail::api::{ApiState, api_routes};
use dripmail::config::EngineConfig;
use dripmail::context::{ContextIndex, LexicalContextIndex};
use dripmail::engine::{
    AutoReplyEngine, ReplyDetector, Scheduler, spawn_reply_detector, spawn_scheduler,
    spawn_send_workers,
};
use dripmail::llm::{Classifier, LlmBackend, LlmConfig, ReplyGenerator, create_provider};
use dripmail::mail::{MaildirPoller, MailRelay, MailboxPoller, SmtpConfig, SmtpRelay};
use dripmail::queue::{DispatchQueue, RetryPolicy};
use dripmail::store::{LibSqlBackend, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = EngineConfig::from_env();

    // ── LLM provider ─────────────────────────────────────────────────────
    let backend = match std::env::var("DRIPMAIL_LLM_BACKEND").as_deref() {
        Ok("openai") => LlmBackend::OpenAi,
        _ => LlmBackend::Anthropic,
    };
    let key_var = match backend {
        LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
        LlmBackend::OpenAi => "OPENAI_API_KEY",
    };
    let api_key = std::env::var(key_var).unwrap_or_else(|_| {
        eprintln!("Error: {key_var} not set");
        std::process::exit(1);
    });
    let model = std::env::var("DRIPMAIL_MODEL")
        .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

    let llm = create_provider(&LlmConfig {
        backend,
        api_key: secrecy::SecretString::from(api_key),
        model,
    })?;

    // ── Database ─────────────────────────────────────────────────────────
    let db_path =
        std::env::var("DRIPMAIL_DB_PATH").unwrap_or_else(|_| "./data/dripmail.db".to_string());
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store: Arc<dyn Store> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {db_path}: {e}");
                std::process::exit(1);
            }),
    );
    store.run_migrations().await?;
    tracing::info!(path = %db_path, "Database ready");

    // ── Mail collaborators ───────────────────────────────────────────────
    let smtp_config = SmtpConfig::from_env().unwrap_or_else(|| {
        eprintln!("Error: DRIPMAIL_SMTP_HOST not set");
        std::process::exit(1);
    });
    let relay: Arc<dyn MailRelay> = Arc::new(SmtpRelay::new(smtp_config));

    let maildir =
        std::env::var("DRIPMAIL_MAILDIR").unwrap_or_else(|_| "./data/maildir".to_string());
    let poller: Arc<dyn MailboxPoller> = Arc::new(MaildirPoller::new(&maildir));
    tracing::info!(path = %maildir, "Watching maildir");

    // ── Engine ───────────────────────────────────────────────────────────
    let queue = DispatchQueue::new(RetryPolicy {
        max_attempts: config.max_send_attempts,
        base_delay: config.retry_base_delay,
    });

    let context: Arc<dyn ContextIndex> = Arc::new(LexicalContextIndex::new(Arc::clone(&store)));
    let classifier = Arc::new(Classifier::new(llm.clone(), config.external_call_timeout));
    let generator = ReplyGenerator::new(llm.clone(), config.external_call_timeout);
    let auto_reply = Arc::new(AutoReplyEngine::new(
        Arc::clone(&store),
        Arc::clone(&relay),
        generator,
        Arc::clone(&context),
        config.clone(),
    ));

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&store),
        Arc::clone(&queue),
        config.clone(),
    ));
    let (scheduler_handle, scheduler_shutdown) = spawn_scheduler(scheduler);

    let worker_handles = spawn_send_workers(
        Arc::clone(&store),
        Arc::clone(&relay),
        Arc::clone(&queue),
        config.clone(),
    );

    let detector = Arc::new(ReplyDetector::new(
        Arc::clone(&store),
        poller,
        classifier,
        Arc::clone(&auto_reply),
        config.clone(),
    ));
    let (detector_handle, detector_shutdown) = spawn_reply_detector(detector);

    // ── API server ───────────────────────────────────────────────────────
    let port: u16 = std::env::var("DRIPMAIL_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    let app = api_routes(ApiState {
        store: Arc::clone(&store),
        auto_reply,
        context,
    });
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
            .await
            .expect("Failed to bind API port");
        tracing::info!(port, "API server started");
        axum::serve(listener, app).await.ok();
    });

    tracing::info!("dripmail v{} running, Ctrl-C to stop", env!("CARGO_PKG_VERSION"));
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    scheduler_shutdown.store(true, Ordering::Relaxed);
    detector_shutdown.store(true, Ordering::Relaxed);
    queue.close();

    for handle in worker_handles {
        handle.await.ok();
    }
    scheduler_handle.abort();
    detector_handle.abort();

    Ok(())
}
