//! Binary entry point: configuration, startup, the acceptor loop, and the
//! ordered shutdown sequence.
#![forbid(unsafe_code)]
use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM, SIGUSR1};
use snap::cache::CacheTree;
use snap::config::ServerConfig;
use snap::log::{info, set_global_logger, start_file_logger_thread, tag};
use snap::mime::MimeTable;
use snap::pool::WorkerPool;
use snap::server::{create_listener, Acceptor};
use snap::{api, tls, SERVER_NAME};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const LOG_FILE: &str = "server.log";
const MIME_FILE: &str = "/etc/mime.types";

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    println!("=== HTTP/HTTPS Server Starting ===");
    println!("Server: {SERVER_NAME}");
    let pid = std::process::id();
    println!("PID: {pid}");

    let config = match ServerConfig::from_args(std::env::args().skip(1)) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };
    println!("Configuration loaded:");
    println!("{}", config.describe());

    match start_file_logger_thread(Path::new(LOG_FILE)) {
        Ok(sender) => {
            let _ignored = set_global_logger(sender);
        }
        Err(e) => eprintln!("failed to open {LOG_FILE}: {e}; logging to stdout"),
    }
    info("server starting", vec![tag("pid", u64::from(pid))]);
    api::record_start_time();

    // Signal handlers only set flags; the acceptor loop observes them.
    // SIGPIPE needs no handler: the runtime ignores it, so an aborted
    // client surfaces as an EPIPE write error instead of killing us.
    let shutdown = Arc::new(AtomicBool::new(false));
    let refresh = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM, SIGQUIT] {
        if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&shutdown)) {
            eprintln!("failed to register signal handler: {e}");
            return 1;
        }
    }
    if let Err(e) = signal_hook::flag::register(SIGUSR1, Arc::clone(&refresh)) {
        eprintln!("failed to register signal handler: {e}");
        return 1;
    }

    let tree = match CacheTree::build(&config.webroot) {
        Ok(tree) => Arc::new(tree),
        Err(e) => {
            eprintln!("failed to build fingerprint tree: {e}");
            return 1;
        }
    };
    info("fingerprint tree built", vec![tag("files", tree.len())]);

    let mime = Arc::new(match MimeTable::from_file(Path::new(MIME_FILE)) {
        Ok(table) if !table.is_empty() => table,
        _ => MimeTable::builtin(),
    });

    let tls_config = match tls::build_server_config(&config.cert_path, &config.key_path) {
        Ok(tls_config) => tls_config,
        Err(e) => {
            eprintln!("failed to initialize TLS: {e}");
            return 1;
        }
    };

    let http = match create_listener(config.http_port) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("failed to listen on port {}: {e}", config.http_port);
            return 1;
        }
    };
    let https = match create_listener(config.https_port) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("failed to listen on port {}: {e}", config.https_port);
            return 1;
        }
    };

    let pool = WorkerPool::new(config.workers, config.max_queue);

    info("server initialized", Vec::new());
    println!("=== Server Ready ===");
    println!("HTTP Port: {}", config.http_port);
    println!("HTTPS Port: {}", config.https_port);
    println!("Press Ctrl+C to shutdown");
    println!("Send SIGUSR1 (kill -USR1 {pid}) to refresh the cache");

    let acceptor = Acceptor::new(
        http,
        https,
        &pool,
        tls_config,
        Arc::clone(&config),
        mime,
        tree,
        shutdown,
        refresh,
    );
    match acceptor {
        Ok(mut acceptor) => acceptor.run(),
        Err(e) => {
            eprintln!("failed to start acceptor: {e}");
            return 1;
        }
    }

    // Shutdown: the acceptor returned, so the listeners are already
    // dropped and no new work arrives.
    println!("=== Shutting down server ===");
    println!("Waiting for pending requests to complete...");
    pool.wait();
    println!("Destroying worker pool...");
    pool.shutdown();
    info("server shutdown complete", Vec::new());
    println!("=== Server stopped ===");
    0
}
