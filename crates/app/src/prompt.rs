use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use common::decide::{Decider, Decision};
use common::reconcile::ConflictDescriptor;

/// Asks on the terminal which side of a conflict wins
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalDecider;

#[async_trait]
impl Decider for TerminalDecider {
    async fn decide(&self, conflict: &ConflictDescriptor) -> Decision {
        let message = conflict.to_string();
        let answer = tokio::task::spawn_blocking(move || ask(&message)).await;

        match answer {
            Ok(Ok(line)) => parse_answer(&line),
            Ok(Err(e)) => {
                tracing::warn!("could not read an answer, taking the remote side: {}", e);
                Decision::TakeRemote
            }
            Err(e) => {
                tracing::warn!("prompt task failed, taking the remote side: {}", e);
                Decision::TakeRemote
            }
        }
    }
}

fn ask(message: &str) -> io::Result<String> {
    let mut stderr = io::stderr().lock();
    write!(stderr, "{} [y/N] ", message)?;
    stderr.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

/// Anything but an explicit yes takes the remote side
pub fn parse_answer(line: &str) -> Decision {
    match line.trim().to_lowercase().as_str() {
        "y" | "yes" => Decision::KeepLocal,
        _ => Decision::TakeRemote,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y\n"), Decision::KeepLocal);
        assert_eq!(parse_answer(" YES "), Decision::KeepLocal);
        assert_eq!(parse_answer("n"), Decision::TakeRemote);
        assert_eq!(parse_answer(""), Decision::TakeRemote);
        assert_eq!(parse_answer("maybe"), Decision::TakeRemote);
    }
}
