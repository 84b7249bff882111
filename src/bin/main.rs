use mfi_backoffice::{cli, config, telemetry};

fn main() {
    let cli = cli::parse_from(std::env::args_os());

    let long_running = matches!(cli.command, cli::Commands::Watch(_));
    let _telemetry_guard = init_tracing(cli.verbose, long_running);

    if let Err(e) = cli::run(cli) {
        tracing::error!("error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8, long_running: bool) -> telemetry::TelemetryGuard {
    let mut cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("config load failed, using defaults: {err}");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };
    if long_running {
        telemetry::apply_watch_logging_defaults(&mut cfg.logging);
    }
    let telemetry_cfg = telemetry::TelemetryConfig::new(verbose, cfg.logging);
    telemetry::init(telemetry_cfg)
}
