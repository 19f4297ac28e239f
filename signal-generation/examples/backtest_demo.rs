// Example: Direction model backtest
// Builds features from a synthetic hourly series, trains the classifier and replays history

use common::{Candle, FeeSchedule};
use signal_generation::{
    prepare_training_data, ArbitrageEvaluator, DirectionModel, ModelConfig,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    println!("=== Direction Model - Backtest Example ===\n");

    let candles = synthetic_candles(500);
    println!("Generated {} hourly candles", candles.len());

    let data = prepare_training_data(&candles)?;
    println!("Feature rows: {}", data.len());
    if let Some(latest) = data.last() {
        println!(
            "Latest: close={:.2} rsi={:.1} ma7={:.2} ma25={:.2}",
            latest.close, latest.raw.rsi, latest.raw.ma7, latest.raw.ma25
        );
    }
    println!();

    let mut model = DirectionModel::with_config(ModelConfig {
        epochs: 20,
        seed: Some(7),
        ..ModelConfig::default()
    });
    model.build();
    let summary = model.train_on(&data)?;
    println!(
        "Trained on {} samples: loss={:.4} accuracy={:.2}%",
        summary.samples,
        summary.loss,
        summary.accuracy * 100.0
    );

    let report = model.backtest(&data)?;
    println!("\nBacktest:");
    println!("  Scored points: {}", report.total_trades);
    println!("  Correct calls: {}", report.profitable_trades);
    println!("  Accuracy: {:.2}%", report.accuracy);
    println!("  Directional P&L: {:.2}%", report.pnl);

    if let Some(latest) = data.last() {
        let confidence = model.predict(&latest.features())?;
        println!(
            "\nNext hour: {} (confidence {:.4})",
            if confidence > 0.5 { "UP" } else { "DOWN" },
            confidence
        );
    }

    println!("\n=== Spread check ===");
    let evaluator = ArbitrageEvaluator::new(FeeSchedule::default());
    for (cex, dex) in [(101.0, 100.0), (100.2, 100.0)] {
        let opp = evaluator.evaluate("BTCUSDC", cex, dex);
        println!(
            "  cex={:.2} dex={:.2} -> {:.4}% ({})",
            cex,
            dex,
            opp.profit_percentage,
            if opp.is_profitable { "profitable" } else { "skip" }
        );
    }

    Ok(())
}

fn synthetic_candles(len: usize) -> Vec<Candle> {
    let mut price = 100.0_f64;
    (0..len)
        .map(|i| {
            let drift = (i as f64 / 24.0).sin() * 0.6 + (i as f64 * 1.3).cos() * 0.4;
            let open = price;
            price = (price + drift).max(1.0);
            Candle {
                timestamp: 1_700_000_000_000 + i as i64 * 3_600_000,
                open,
                high: open.max(price) * 1.002,
                low: open.min(price) * 0.998,
                close: price,
                volume: 1_000.0 + (i % 24) as f64 * 10.0,
            }
        })
        .collect()
}
