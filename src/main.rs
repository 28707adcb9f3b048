use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use mailwatch::cli::{self, Command};
use mailwatch::config::{MailboxConfig, Settings};
use mailwatch::notify::Notifier;
use mailwatch::store::{LibSqlStore, MailStore};
use mailwatch::sync::{
    ImapTransport, MailTransport, Scheduler, Strategy, run_cycle, spawn_scheduler,
};

/// How long a triggered shutdown may wait for the in-flight candidate.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    let command = match cli::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("Error: {message}\n");
            eprintln!("{}", cli::USAGE);
            std::process::exit(2);
        }
    };

    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Error: failed to install rustls crypto provider");
        std::process::exit(1);
    }

    let verbose = match &command {
        Command::Fetch { verbose, .. } | Command::Watch { verbose, .. } => *verbose,
        Command::AddMailbox { .. } => false,
    };
    init_tracing(verbose);

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let store = match LibSqlStore::new_local(&settings.db_path).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!(
                "Error: failed to open database at {}: {e}",
                settings.db_path.display()
            );
            std::process::exit(1);
        }
    };

    let code = match command {
        Command::Fetch {
            names, strategy, ..
        } => run_fetch(&store, names, strategy).await,
        Command::Watch {
            interval, strategy, ..
        } => {
            let interval = interval.unwrap_or(settings.fetch_interval);
            run_watch(store, strategy, interval).await
        }
        Command::AddMailbox {
            name,
            uri,
            folder,
            archive,
        } => run_add_mailbox(&store, name, uri, folder, archive).await,
    };
    std::process::exit(code);
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();
}

/// One pass over the selected mailboxes, then exit.
async fn run_fetch(store: &LibSqlStore, names: Vec<String>, strategy: Strategy) -> i32 {
    let transport = ImapTransport;
    let notifier = Notifier::from_env();

    let mailboxes = match store.list_active_mailboxes().await {
        Ok(mailboxes) => mailboxes,
        Err(e) => {
            eprintln!("Error: failed to load mailbox configs: {e}");
            return 1;
        }
    };

    let selected: Vec<MailboxConfig> = if names.is_empty() {
        mailboxes
    } else {
        for name in &names {
            if !mailboxes.iter().any(|m| &m.name == name) {
                eprintln!("Error: no active mailbox named {name:?}");
                return 1;
            }
        }
        mailboxes
            .into_iter()
            .filter(|m| names.contains(&m.name))
            .collect()
    };

    if selected.is_empty() {
        eprintln!("No active mailboxes configured; add one with add-mailbox");
        return 1;
    }

    // One-shot runs never get a shutdown request; the flag is still
    // threaded through so cycles share one code path with the scheduler.
    let shutdown = AtomicBool::new(false);
    for mailbox in &selected {
        let outcome = run_cycle(
            &transport,
            store,
            notifier.as_ref(),
            mailbox,
            strategy,
            &shutdown,
        )
        .await;
        println!("{outcome}");
    }

    // Skips and aborted cycles are reported in the outcome lines; the
    // next run is the retry. Only startup conditions exit non-zero.
    0
}

/// Scheduler loop until SIGINT/SIGTERM.
async fn run_watch(store: LibSqlStore, strategy: Strategy, interval: Duration) -> i32 {
    let transport: Arc<dyn MailTransport> = Arc::new(ImapTransport);
    let store: Arc<dyn MailStore> = Arc::new(store);
    let notifier = Notifier::from_env().map(Arc::new);

    let scheduler = Arc::new(Scheduler::new(
        transport, store, notifier, strategy, interval,
    ));
    let (handle, shutdown) = spawn_scheduler(scheduler);

    wait_for_signal().await;
    tracing::info!("Shutdown signal received");
    shutdown.trigger();

    match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
        Ok(_) => 0,
        Err(_) => {
            tracing::warn!("Scheduler did not stop within grace period, aborting");
            1
        }
    }
}

async fn run_add_mailbox(
    store: &LibSqlStore,
    name: String,
    uri: String,
    folder: Option<String>,
    archive: Option<String>,
) -> i32 {
    let mut config = MailboxConfig::new(name, uri);
    if let Some(folder) = folder {
        config.folder = folder;
    }
    config.archive_folder = archive;

    // Reject a malformed URI now rather than on the first cycle.
    if let Err(e) = config.descriptor() {
        eprintln!("Error: {e}");
        return 2;
    }

    match store.insert_mailbox(&config).await {
        Ok(()) => {
            println!("Registered mailbox {} ({})", config.name, config.folder);
            0
        }
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!("Failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
