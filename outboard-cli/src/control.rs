//! Line-based navigation commands
//!
//! One command per line, whitespace separated. Every command gets a
//! one-line reply, JSON for `status`, `where` and `anchor`.

use crate::error::{CliError, CliResult};
use outboard_core::types::PixelRect;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    Next,
    Previous,
    First,
    Last,
    Goto(u64),
    Delete,
    /// Start the movie, optionally with a new interval
    Movie(Option<Duration>),
    Stop,
    Zoom(PixelRect),
    Reset,
    ToggleReplot,
    Frame(u32),
    ToggleTracking,
    /// Set the relative anchor; `None` clears it
    Anchor(Option<(f64, f64)>),
    Where(f64, f64),
    Status,
    Quit,
}

impl ControlCommand {
    pub fn parse(line: &str) -> CliResult<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(CliError::control("empty command"));
        };
        let args: Vec<&str> = words.collect();

        let command = match verb.to_ascii_lowercase().as_str() {
            "next" | "n" => no_args(verb, &args, Self::Next)?,
            "prev" | "previous" | "p" => no_args(verb, &args, Self::Previous)?,
            "first" => no_args(verb, &args, Self::First)?,
            "last" => no_args(verb, &args, Self::Last)?,
            "goto" => Self::Goto(exactly::<u64, 1>(verb, &args)?[0]),
            "delete" => no_args(verb, &args, Self::Delete)?,
            "movie" => match args.as_slice() {
                [] => Self::Movie(None),
                [ms] => Self::Movie(Some(Duration::from_millis(number(verb, ms)?))),
                _ => return Err(arity(verb, "[milliseconds]")),
            },
            "stop" => no_args(verb, &args, Self::Stop)?,
            "zoom" => {
                let [x, y, w, h] = exactly::<i32, 4>(verb, &args)?;
                Self::Zoom(PixelRect::new(x, y, w, h))
            }
            "reset" => no_args(verb, &args, Self::Reset)?,
            "replot-toggle" | "replot" => no_args(verb, &args, Self::ToggleReplot)?,
            "frame" => Self::Frame(exactly::<u32, 1>(verb, &args)?[0]),
            "track" => no_args(verb, &args, Self::ToggleTracking)?,
            "anchor" => match args.as_slice() {
                [] => Self::Anchor(None),
                [x, y] => Self::Anchor(Some((number(verb, x)?, number(verb, y)?))),
                _ => return Err(arity(verb, "[px py]")),
            },
            "where" => {
                let [x, y] = exactly::<f64, 2>(verb, &args)?;
                Self::Where(x, y)
            }
            "status" => no_args(verb, &args, Self::Status)?,
            "quit" | "exit" => no_args(verb, &args, Self::Quit)?,
            other => return Err(CliError::control(format!("unknown command '{}'", other))),
        };
        Ok(command)
    }
}

fn no_args(verb: &str, args: &[&str], command: ControlCommand) -> CliResult<ControlCommand> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(arity(verb, "no arguments"))
    }
}

fn exactly<T: std::str::FromStr, const N: usize>(verb: &str, args: &[&str]) -> CliResult<[T; N]> {
    if args.len() != N {
        return Err(arity(verb, &format!("{} argument(s)", N)));
    }
    let values = args
        .iter()
        .map(|a| number(verb, a))
        .collect::<CliResult<Vec<T>>>()?;
    values
        .try_into()
        .map_err(|_| arity(verb, &format!("{} argument(s)", N)))
}

fn number<T: std::str::FromStr>(verb: &str, text: &str) -> CliResult<T> {
    text.parse()
        .map_err(|_| CliError::control(format!("{}: '{}' is not a valid number", verb, text)))
}

fn arity(verb: &str, expected: &str) -> CliError {
    CliError::control(format!("{} takes {}", verb, expected))
}
