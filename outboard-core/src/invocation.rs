//! Structured producer command line
//!
//! The command that produced the plot stream is split into tokens once,
//! at startup. Zoom-replot rewrites it by structural lookup on option
//! names: axis-limit, scale and zoom clauses are dropped, a fresh limit
//! clause is appended, and the output is redirected to a file.
//!
//! Options are matched case-insensitively by prefix, as the producer does:
//! `-lim`, `-sc`, `-zo` are removed; `-mo`, `-fa`, `-of` carry axis
//! transforms; `-col` and `-par` open a new plot request.

use crate::types::DataBounds;
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("Producer command line is empty")]
    Empty,

    #[error("Unterminated {0} quote in producer command line")]
    UnterminatedQuote(char),

    #[error("Zoom replot cannot invert -mode keyword '{keyword}' (normalize, offset, eoffset, center, meanCenter, coffset and fractionalDeviation are not supported)")]
    UnsupportedMode { keyword: String },

    #[error("Invalid number '{value}' in option {option}")]
    InvalidNumber { option: String, value: String },
}

pub type InvocationResult<T> = Result<T, InvocationError>;

/// Mode keywords whose transforms cannot be inverted from frame bounds
const UNSUPPORTED_MODE_PREFIXES: &[&str] = &["n", "o", "e", "m", "co", "ce", "f"];

/// One command-line argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationArg {
    text: String,
}

impl InvocationArg {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Lowercased option name without the leading dash, if this is an option
    pub fn option_name(&self) -> Option<String> {
        let body = self.text.strip_prefix('-')?;
        let name = body.split('=').next().unwrap_or(body);
        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
            return None;
        }
        Some(name.to_ascii_lowercase())
    }

    /// Text following the first `=`
    pub fn option_value(&self) -> Option<&str> {
        self.text.split_once('=').map(|(_, v)| v)
    }

    fn is_option(&self, prefix: &str) -> bool {
        self.option_name().map_or(false, |name| name.starts_with(prefix))
    }

    /// Comma-separated `key=value` pairs of the option value
    fn pairs(&self) -> Vec<(String, String)> {
        self.option_value()
            .unwrap_or("")
            .split(',')
            .filter_map(|item| item.split_once('='))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect()
    }
}

/// Per-axis transform applied by the producer before plotting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisTransform {
    pub multiplier: f64,
    pub offset: f64,
    pub log: bool,
}

impl Default for AxisTransform {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            offset: 0.0,
            log: false,
        }
    }
}

impl AxisTransform {
    /// Undo the transform for a displayed value.
    pub fn invert(&self, displayed: f64) -> f64 {
        let linear = displayed / self.multiplier - self.offset;
        if self.log {
            10f64.powf(linear)
        } else {
            linear
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisTransforms {
    pub x: AxisTransform,
    pub y: AxisTransform,
}

impl AxisTransforms {
    /// Bounds in the producer's untransformed data units
    pub fn invert_bounds(&self, bounds: DataBounds) -> DataBounds {
        DataBounds::new(
            self.x.invert(bounds.x_min),
            self.x.invert(bounds.x_max),
            self.y.invert(bounds.y_min),
            self.y.invert(bounds.y_max),
        )
        .ordered()
    }
}

/// Transform state tracked while walking the token stream
///
/// Modifiers given before the first plot request are global; each
/// `-column` or `-parameter` starts a request that inherits the globals
/// and may override them.
#[derive(Debug, Clone, Copy, Default)]
struct TransformTracker {
    global: AxisTransforms,
    request: AxisTransforms,
    in_request: bool,
}

impl TransformTracker {
    fn start_request(&mut self) {
        self.in_request = true;
        self.request = self.global;
    }

    fn update(&mut self, apply: impl Fn(&mut AxisTransforms)) {
        apply(&mut self.request);
        if !self.in_request {
            apply(&mut self.global);
        }
    }
}

fn parse_number(arg: &InvocationArg, value: &str) -> InvocationResult<f64> {
    value.parse::<f64>().map_err(|_| InvocationError::InvalidNumber {
        option: arg.as_str().to_string(),
        value: value.to_string(),
    })
}

/// Walk the arguments once, tracking per-axis transforms.
///
/// Returns the transforms in force at the end of the command line and the
/// first `-mode` keyword that cannot be inverted, if any.
fn scan_transforms(args: &[InvocationArg]) -> InvocationResult<(AxisTransforms, Option<String>)> {
    let mut tracker = TransformTracker::default();
    let mut unsupported = None;
    for arg in args {
        if arg.is_option("mo") {
            for (axis, value) in arg.pairs() {
                let value = value.to_ascii_lowercase();
                if UNSUPPORTED_MODE_PREFIXES.iter().any(|p| value.starts_with(p)) {
                    unsupported.get_or_insert(value);
                    continue;
                }
                if value.starts_with("lo") {
                    match axis.as_str() {
                        "x" => tracker.update(|t| t.x.log = true),
                        "y" => tracker.update(|t| t.y.log = true),
                        _ => {}
                    }
                }
            }
        } else if arg.is_option("col") || arg.is_option("par") {
            tracker.start_request();
        } else if arg.is_option("fa") {
            for (key, value) in arg.pairs() {
                let factor = parse_number(arg, &value)?;
                if key.starts_with("xm") {
                    tracker.update(|t| t.x.multiplier = factor);
                } else if key.starts_with("ym") {
                    tracker.update(|t| t.y.multiplier = factor);
                }
            }
        } else if arg.is_option("of") {
            for (key, value) in arg.pairs() {
                let change = parse_number(arg, &value)?;
                if key.starts_with("xc") {
                    tracker.update(|t| t.x.offset = change);
                } else if key.starts_with("yc") {
                    tracker.update(|t| t.y.offset = change);
                }
            }
        }
    }
    let transforms = if tracker.in_request {
        tracker.request
    } else {
        tracker.global
    };
    Ok((transforms, unsupported))
}

/// Tokenized producer command line
///
/// Axis transforms are resolved once at parse time. A `-mode` keyword that
/// cannot be inverted is remembered and refused only when a zoom rewrite
/// is requested.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerInvocation {
    program: String,
    args: Vec<InvocationArg>,
    transforms: AxisTransforms,
    unsupported_mode: Option<String>,
}

impl ProducerInvocation {
    pub fn parse(command_line: &str) -> InvocationResult<Self> {
        let mut tokens = tokenize(command_line)?.into_iter();
        let program = tokens.next().ok_or(InvocationError::Empty)?;
        let args: Vec<InvocationArg> = tokens.map(InvocationArg::new).collect();
        let (transforms, unsupported_mode) = scan_transforms(&args)?;
        Ok(Self {
            program,
            args,
            transforms,
            unsupported_mode,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(InvocationArg::as_str)
    }

    pub fn transforms(&self) -> AxisTransforms {
        self.transforms
    }

    /// Copy with limits replaced by `bounds` and output sent to `output`.
    ///
    /// `bounds` are in displayed units; they are inverted through the
    /// command line's axis transforms before being written.
    pub fn rewrite_for_zoom(&self, bounds: DataBounds, output: &Path) -> InvocationResult<Self> {
        if let Some(keyword) = &self.unsupported_mode {
            return Err(InvocationError::UnsupportedMode {
                keyword: keyword.clone(),
            });
        }
        let limits = self.transforms.invert_bounds(bounds);
        let mut args: Vec<InvocationArg> = self
            .args
            .iter()
            .filter(|arg| {
                !(arg.is_option("lim") || arg.is_option("sc") || arg.is_option("zo") || arg.is_option("ou"))
            })
            .cloned()
            .collect();
        args.push(InvocationArg::new(format!(
            "-limit=xMin={},xMax={},yMin={},yMax={},autoscaling",
            limits.x_min, limits.x_max, limits.y_min, limits.y_max
        )));
        args.push(output_arg(output));
        Ok(self.derived(args))
    }

    /// Copy of the original command with output sent to `output`.
    pub fn with_output(&self, output: &Path) -> Self {
        let mut args: Vec<InvocationArg> = self.args.iter().filter(|a| !a.is_option("ou")).cloned().collect();
        args.push(output_arg(output));
        self.derived(args)
    }

    fn derived(&self, args: Vec<InvocationArg>) -> Self {
        Self {
            program: self.program.clone(),
            args,
            transforms: self.transforms,
            unsupported_mode: self.unsupported_mode.clone(),
        }
    }
}

fn output_arg(output: &Path) -> InvocationArg {
    InvocationArg::new(format!("-output={}", output.display()))
}

impl fmt::Display for ProducerInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg.as_str()))?;
        }
        Ok(())
    }
}

fn quote(text: &str) -> String {
    if !text.is_empty() && !text.contains(|c: char| c.is_whitespace() || c == '\'' || c == '"') {
        text.to_string()
    } else if !text.contains('\'') {
        format!("'{}'", text)
    } else {
        format!("\"{}\"", text)
    }
}

/// Split on whitespace, honouring single and double quotes.
///
/// Quotes may appear inside a word (`-col=x,'y z'`) and are stripped.
pub fn tokenize(line: &str) -> InvocationResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if let Some(q) = quote {
        return Err(InvocationError::UnterminatedQuote(q));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
