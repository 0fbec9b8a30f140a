use clap::Parser;
use trackbot::engine::{EngineConfig, PollingOrchestrator};
use trackbot::models::{Candle, Signal, Timeframe};
use trackbot::output::{event_channel, spawn_sink_forwarder, OutputSink};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "trackbot", about = "Futures price tracker with SMA signal")]
struct Cli {
    /// Venue to poll (binance, bybit, okx)
    #[arg(long, default_value = "binance")]
    venue: String,

    /// Futures symbol, compact form
    #[arg(long, default_value = "WALUSDT")]
    symbol: String,

    /// Candle timeframe (1m, 5m, 15m, 1h)
    #[arg(long, default_value = "1m")]
    timeframe: String,

    /// SMA period over closing prices
    #[arg(long, default_value_t = 20)]
    period: usize,

    /// Seconds between live-price polls
    #[arg(long, default_value_t = 1)]
    update_interval_secs: u64,
}

/// Prints engine notifications through the logging pipeline
struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn on_status(&self, text: &str) {
        tracing::info!("{}", text);
    }

    fn on_result(&self, price: f64, indicator: f64, signal: Signal) {
        tracing::info!(
            "price ${:.4} | SMA ${:.4} | signal: {}",
            price,
            indicator,
            signal
        );
    }

    fn on_candles(&self, candles: &[Candle]) {
        tracing::info!("--- last {} closed candles ---", candles.len());
        for candle in candles {
            let direction = if candle.close >= candle.open { "+" } else { "-" };
            tracing::info!(
                "{} {} O:{:.4} H:{:.4} L:{:.4} C:{:.4} V:{:.0}",
                candle.open_time.format("%H:%M"),
                direction,
                candle.open,
                candle.high,
                candle.low,
                candle.close,
                candle.volume
            );
        }
    }

    fn on_error(&self, message: &str) {
        tracing::error!("{}", message);
    }
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trackbot=info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let timeframe: Timeframe = cli.timeframe.parse()?;

    let config = EngineConfig {
        symbol: cli.symbol.to_ascii_uppercase(),
        timeframe,
        ma_period: cli.period,
        update_interval: Duration::from_secs(cli.update_interval_secs.max(1)),
        ..EngineConfig::default()
    };

    tracing::info!(
        "trackbot starting: {} {} on {} (SMA {}, poll every {}s)",
        config.symbol,
        config.timeframe,
        cli.venue,
        config.ma_period,
        config.update_interval.as_secs()
    );

    let (events, rx) = event_channel();
    let sink_task = spawn_sink_forwarder(rx, ConsoleSink);

    let mut engine = PollingOrchestrator::new(config, events);
    if let Err(e) = engine.start(&cli.venue).await {
        // The sink already carried the details for fetch failures; an
        // unknown venue never reaches it
        anyhow::bail!("failed to start: {}", e);
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("received Ctrl+C, shutting down...");

    engine.stop();
    drop(engine);
    sink_task.await?;

    Ok(())
}
