//! Non-terminating argument parser.
//!
//! [`CommandParser`] wraps a runtime-built [`clap::Command`]. A parse failure never
//! ends the process unless the parser was explicitly switched to
//! [`FailurePolicy::Terminate`], which only the process entry point does.
use crate::error::{CommandError, CommandErrorKind, ExitRequest, ParseError};
use crate::output::OutputSink;
use crate::value::{Options, ParsedInvocation, Value};
use clap::error::ErrorKind;
use clap::{ArgAction, ArgMatches};
use std::path::PathBuf;
use tracing::{debug, warn};

/// What a parse failure turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Return a [`CommandError`] prefixed with `"Error: "`.
    #[default]
    Raise,
    /// Print clap's report (usage included) to the parser's stderr sink and exit
    /// the process with clap's status. Only valid when the command is the process.
    Terminate,
}

/// An argument parser that reports failures as values.
#[derive(Debug, Clone)]
pub struct CommandParser {
    command: clap::Command,
    missing_args_message: Option<String>,
    policy: FailurePolicy,
    stderr: OutputSink,
}

impl CommandParser {
    /// Wrap `command`. The argument vector handed to [`CommandParser::parse`] never
    /// includes the program name.
    pub fn new(command: clap::Command) -> Self {
        let mut command = command.no_binary_name(true);
        command.build();
        Self {
            command,
            missing_args_message: None,
            policy: FailurePolicy::default(),
            stderr: OutputSink::stderr(),
        }
    }

    pub fn prog(&self) -> &str {
        self.command.get_name()
    }

    pub fn command(&self) -> &clap::Command {
        &self.command
    }

    /// Friendlier message used when the vector is empty but arguments are needed.
    /// Setting one also marks the command as requiring arguments.
    pub fn set_missing_args_message(&mut self, message: Option<String>) {
        self.missing_args_message = message;
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn set_failure_policy(&mut self, policy: FailurePolicy) {
        self.policy = policy;
    }

    /// Sink the entry-point backend reports to before exiting.
    pub fn set_stderr(&mut self, stderr: OutputSink) {
        self.stderr = stderr;
    }

    /// Whether an empty argument vector can never satisfy this parser.
    pub fn requires_arguments(&self) -> bool {
        self.missing_args_message.is_some()
            || self.command.get_positionals().any(|arg| arg.is_required_set())
    }

    pub fn format_usage(&self) -> String {
        self.command.clone().render_usage().to_string()
    }

    pub fn format_help(&self) -> String {
        self.command.clone().render_help().to_string()
    }

    /// Parse `argv` against the schema.
    ///
    /// Help and version requests come back as [`ParseError::Exit`] in every mode.
    /// Schema violations come back as [`ParseError::Command`] under
    /// [`FailurePolicy::Raise`] and end the process under
    /// [`FailurePolicy::Terminate`].
    pub fn parse(&self, argv: &[String]) -> Result<ParsedInvocation, ParseError> {
        match self.matches(argv) {
            Ok(matches) => {
                let invocation = self.collect(&matches);
                debug!(
                    prog = %self.prog(),
                    args = invocation.args.len(),
                    options = invocation.options.len(),
                    "parsed arguments"
                );
                Ok(invocation)
            }
            Err((_, err)) if is_exit_request(err.kind()) => {
                let text = err.to_string();
                Err(ExitRequest::new(err.exit_code(), Some(text.trim_end().to_string())).into())
            }
            Err((kind, err)) => Err(self.fail(kind, err)),
        }
    }

    fn matches(&self, argv: &[String]) -> Result<ArgMatches, (CommandErrorKind, clap::Error)> {
        if argv.is_empty() && self.requires_arguments() {
            let kind = CommandErrorKind::MissingArguments;
            if let Some(message) = &self.missing_args_message {
                let err = self
                    .command
                    .clone()
                    .error(ErrorKind::MissingRequiredArgument, message);
                return Err((kind, err));
            }
            return self.command.clone().try_get_matches_from(argv).map_err(|err| (kind, err));
        }
        self.command
            .clone()
            .try_get_matches_from(argv)
            .map_err(|err| (CommandErrorKind::InvalidArguments, err))
    }

    fn collect(&self, matches: &ArgMatches) -> ParsedInvocation {
        let mut args = Vec::new();
        let mut options = Options::new();
        for arg in self.command.get_arguments() {
            let id = arg.get_id().as_str();
            let mut values = match arg.get_action() {
                ArgAction::SetTrue | ArgAction::SetFalse => {
                    let flag = matches.try_get_one::<bool>(id).ok().flatten();
                    vec![Value::Bool(flag.copied().unwrap_or(false))]
                }
                ArgAction::Count => {
                    let count = matches.try_get_one::<u8>(id).ok().flatten();
                    vec![Value::Int(count.copied().map(i64::from).unwrap_or(0))]
                }
                ArgAction::Set | ArgAction::Append => typed_values(matches, id),
                _ => continue,
            };

            if arg.is_positional() {
                args.append(&mut values);
                continue;
            }
            let value = match values.len() {
                0 => continue,
                1 if !matches!(arg.get_action(), ArgAction::Append) => values.remove(0),
                _ => Value::List(values),
            };
            options.insert(id.to_string(), value);
        }
        ParsedInvocation::new(args, options)
    }

    fn fail(&self, kind: CommandErrorKind, err: clap::Error) -> ParseError {
        match self.policy {
            FailurePolicy::Terminate => self.terminate(&err),
            FailurePolicy::Raise => {
                let message = summary(&err);
                debug!(prog = %self.prog(), %message, "parse failed");
                CommandError::with_kind(kind, format!("Error: {}", message)).into()
            }
        }
    }

    fn terminate(&self, err: &clap::Error) -> ! {
        if let Err(write_err) = self.report(err) {
            warn!(error = %write_err, "failed to write usage report");
        }
        std::process::exit(err.exit_code())
    }

    pub(crate) fn report(&self, err: &clap::Error) -> std::io::Result<()> {
        self.stderr.write_with(err, Some(""))
    }
}

fn is_exit_request(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
    )
}

/// Values of `id` converted by whichever value parser the argument declared.
fn typed_values(matches: &ArgMatches, id: &str) -> Vec<Value> {
    if let Ok(Some(values)) = matches.try_get_many::<i64>(id) {
        return values.copied().map(Value::Int).collect();
    }
    if let Ok(Some(values)) = matches.try_get_many::<f64>(id) {
        return values.copied().map(Value::Float).collect();
    }
    if let Ok(Some(values)) = matches.try_get_many::<PathBuf>(id) {
        return values
            .map(|path| Value::Str(path.to_string_lossy().into_owned()))
            .collect();
    }
    match matches.try_get_many::<String>(id) {
        Ok(Some(values)) => values.cloned().map(Value::Str).collect(),
        _ => Vec::new(),
    }
}

/// First paragraph of clap's report on one line, without the `error: ` label.
fn summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let head = rendered.split("\n\n").next().unwrap_or_default();
    let head = head.strip_prefix("error: ").unwrap_or(head);
    head.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
