//! Terminal play mode.
//!
//! A line-oriented loop over the client controller:
//! - `1`/`a` and `2`/`b` pick an option
//! - lines starting with `#` are commands (retry, status, restart, quit, help)
//! - the countdown runs the whole time and can end the game mid-prompt

use anyhow::Result;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use trial_core::{
    ControllerError, Ending, EndingReport, Segment, SessionId, StoryBackend, TrialController,
    Turn,
};

enum Input {
    Choose(usize),
    Retry,
    Status,
    Restart,
    Quit,
    Help,
    Unknown,
}

fn parse_input(line: &str) -> Input {
    match line.trim().to_lowercase().as_str() {
        "1" | "a" => Input::Choose(0),
        "2" | "b" => Input::Choose(1),
        "#retry" => Input::Retry,
        "#status" => Input::Status,
        "#restart" => Input::Restart,
        "#quit" | "#exit" => Input::Quit,
        "#help" => Input::Help,
        _ => Input::Unknown,
    }
}

fn print_help() {
    println!("  1 or a       - Take the first option");
    println!("  2 or b       - Take the second option");
    println!("  #retry       - Resend the last failed request");
    println!("  #status      - Show time left and steps taken");
    println!("  #restart     - Start the trial over");
    println!("  #quit        - Exit");
}

fn print_segment(segment: &Segment) {
    println!();
    println!("{}", segment.narrative);
    if !segment.is_terminal() {
        println!();
        println!("  [1] {}", segment.options[0].text);
        println!("  [2] {}", segment.options[1].text);
    }
    println!();
}

fn print_ending(report: &EndingReport) {
    println!();
    match report.ending {
        Ending::Escaped => println!("=== YOU ESCAPED ==="),
        Ending::Died => println!("=== YOU DIED ==="),
        Ending::TimeExpired => println!("=== TIME EXPIRED ==="),
    }
    println!(
        "Steps taken: {}   Time left: {}:{:02}",
        report.steps,
        report.time_remaining / 60,
        report.time_remaining % 60
    );
}

async fn begin<B: StoryBackend>(controller: &TrialController<B>) {
    match controller.start().await {
        Ok(opening) => print_segment(&opening),
        Err(e) => println!("[ERROR] {e} (type #retry)"),
    }
}

/// Play one trial in the terminal.
pub async fn run_headless<B: StoryBackend>(
    backend: B,
    session_id: SessionId,
    countdown: Duration,
) -> Result<()> {
    let controller = TrialController::new(backend, session_id, countdown);

    println!("=== Trial of Fire ===");
    println!("You have {} seconds.", countdown.as_secs());
    print_help();

    begin(&controller).await;
    let mut clock = controller.start_countdown();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let line = tokio::select! {
            report = controller.wait_game_over() => {
                if let Some(report) = report {
                    print_ending(&report);
                }
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };

        match parse_input(&line) {
            Input::Choose(index) => match controller.choose(index).await {
                Ok(Turn::Continue(segment)) => print_segment(&segment),
                Ok(Turn::Over(report)) => {
                    if let Some(segment) = controller.state().current {
                        if report.ending != Ending::TimeExpired {
                            print_segment(&segment);
                        }
                    }
                    print_ending(&report);
                    break;
                }
                Err(ControllerError::Backend(e)) => {
                    println!("[ERROR] {e} (type #retry)");
                }
                Err(e) => println!("[ERROR] {e}"),
            },
            Input::Retry => match controller.retry().await {
                Ok(Turn::Continue(segment)) => print_segment(&segment),
                Ok(Turn::Over(report)) => {
                    print_ending(&report);
                    break;
                }
                Err(e) => println!("[ERROR] {e}"),
            },
            Input::Status => {
                let state = controller.state();
                println!(
                    "[STATUS] step {}   time left {}s{}",
                    state.history.len(),
                    state.time_remaining,
                    if state.loading { "   (waiting)" } else { "" }
                );
            }
            Input::Restart => {
                clock.stop();
                begin(&controller).await;
                clock = controller.start_countdown();
            }
            Input::Quit => {
                println!("Goodbye!");
                break;
            }
            Input::Help => print_help(),
            Input::Unknown => println!("[ERROR] Unknown input. Type #help for help."),
        }
    }

    clock.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert!(matches!(parse_input("1"), Input::Choose(0)));
        assert!(matches!(parse_input(" B "), Input::Choose(1)));
        assert!(matches!(parse_input("#retry"), Input::Retry));
        assert!(matches!(parse_input("#EXIT"), Input::Quit));
        assert!(matches!(parse_input("3"), Input::Unknown));
    }
}
