use hydrant_core::{CountdownTicker, DepletionProjection};
use serde_json::json;

use crate::cli::CountdownArgs;
use crate::error::CliError;

use super::CommandResult;

/// Runs the countdown for a fixed number of one-second frames and reports
/// them. The ticker is stopped before returning, so nothing publishes past
/// the last collected frame.
pub async fn run(args: &CountdownArgs) -> Result<CommandResult, CliError> {
    if args.daily <= 0.0 {
        return Err(CliError::Command(String::from(
            "--daily must be a positive consumption figure",
        )));
    }

    let projection = DepletionProjection::new(args.volume, args.daily);
    let ticker = CountdownTicker::new();
    let mut receiver = ticker.subscribe();

    ticker.render(projection);
    let mut frames = vec![*receiver.borrow_and_update()];

    for _ in 0..args.ticks {
        if receiver.changed().await.is_err() {
            break;
        }
        let frame = *receiver.borrow_and_update();
        frames.push(frame);
        if frame.is_depleted() {
            break;
        }
    }
    ticker.stop();

    let rendered: Vec<_> = frames
        .iter()
        .map(|frame| {
            json!({
                "remaining_volume": frame.remaining_volume,
                "seconds_to_empty": frame.seconds_to_empty,
            })
        })
        .collect();

    Ok(CommandResult::ok(json!({
        "per_second": projection.per_second,
        "frames": rendered,
    })))
}
