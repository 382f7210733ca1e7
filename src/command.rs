use crate::error::{
    CommandError, ExitCode, ExitRequest, NotImplemented, ParseError, error_kind,
};
use crate::output::OutputSink;
use crate::parser::{CommandParser, FailurePolicy};
use crate::value::{Options, ParsedInvocation, Value};
use anyhow::Result;
use clap::{Arg, ArgAction};
use tracing::{debug, warn};

/// Id of the reserved `--traceback` flag.
pub const TRACEBACK: &str = "traceback";

/// The pair of output sinks a command writes to.
#[derive(Debug, Clone)]
pub struct Streams {
    pub stdout: OutputSink,
    pub stderr: OutputSink,
}

impl Streams {
    pub fn new(stdout: OutputSink, stderr: OutputSink) -> Self {
        Self { stdout, stderr }
    }
}

impl Default for Streams {
    fn default() -> Self {
        Self::new(OutputSink::stdout(), OutputSink::stderr())
    }
}

/// Per-call replacements for a command's sinks.
#[derive(Debug, Clone, Default)]
pub struct Redirect {
    pub stdout: Option<OutputSink>,
    pub stderr: Option<OutputSink>,
}

impl Redirect {
    fn apply(self, streams: &Streams) -> Streams {
        Streams {
            stdout: self.stdout.unwrap_or_else(|| streams.stdout.clone()),
            stderr: self.stderr.unwrap_or_else(|| streams.stderr.clone()),
        }
    }
}

/// A named, schema-driven unit of work.
///
/// Implementors declare their arguments in [`Command::add_arguments`] and their
/// logic in [`Command::handle`]. Everything else (parsing, output, error
/// reporting) is done by [`BaseCommand`].
pub trait Command {
    /// Program name used in usage text and for dispatch.
    fn name(&self) -> &str;

    /// A short description printed in help messages.
    fn help(&self) -> &str {
        ""
    }

    /// When set, an empty argument vector is reported with this message instead
    /// of the parser's generic one.
    fn missing_args_message(&self) -> Option<&str> {
        None
    }

    /// Declare positional arguments and options on the command's clap schema.
    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd
    }

    /// The actual logic of the command.
    ///
    /// Returned text is written to stdout. Commands that do not override this
    /// fail with [`NotImplemented`].
    fn handle(
        &mut self,
        _streams: &Streams,
        _args: &[Value],
        _options: &Options,
    ) -> Result<Option<String>> {
        Err(NotImplemented::new(self.name()).into())
    }
}

/// Lifecycle shared by every command: owns the command's parser and sinks, turns
/// argument vectors into invocations and classifies what goes wrong.
pub struct BaseCommand {
    command: Box<dyn Command>,
    parser: CommandParser,
    streams: Streams,
    called_from_command_line: bool,
}

impl BaseCommand {
    pub fn new(command: impl Command + 'static) -> Self {
        Self::from_boxed(Box::new(command), Streams::default())
    }

    pub fn with_streams(command: impl Command + 'static, streams: Streams) -> Self {
        Self::from_boxed(Box::new(command), streams)
    }

    pub fn from_boxed(command: Box<dyn Command>, streams: Streams) -> Self {
        let parser = create_parser(command.as_ref(), &streams);
        Self {
            command,
            parser,
            streams,
            called_from_command_line: false,
        }
    }

    pub fn name(&self) -> &str {
        self.command.name()
    }

    pub fn help(&self) -> &str {
        self.command.help()
    }

    pub fn parser(&self) -> &CommandParser {
        &self.parser
    }

    pub fn streams(&self) -> &Streams {
        &self.streams
    }

    pub fn called_from_command_line(&self) -> bool {
        self.called_from_command_line
    }

    /// Parse `argv`, moving the reserved `--traceback` flag out of the options.
    pub fn parse(&self, argv: &[String]) -> Result<ParsedInvocation, ParseError> {
        let mut invocation = self.parser.parse(argv)?;
        invocation.traceback = matches!(invocation.options.remove(TRACEBACK), Some(Value::Bool(true)));
        Ok(invocation)
    }

    /// Run the command as the process's main action and return the exit status.
    ///
    /// Parse failures print usage and end the process. Failures from the command
    /// itself are reported on stderr; with `--traceback` they are returned as
    /// `Err` untouched instead.
    pub fn run_from_argv(&mut self, argv: &[String]) -> Result<ExitCode> {
        self.called_from_command_line = true;
        self.parser.set_failure_policy(FailurePolicy::Terminate);

        let invocation = match self.parse(argv) {
            Ok(invocation) => invocation,
            Err(ParseError::Exit(request)) => return self.report_exit_request(&request),
            Err(ParseError::Command(err)) => {
                self.streams.stderr.write_line(&err)?;
                return Ok(2);
            }
        };

        let traceback = invocation.traceback;
        match self.execute(&invocation.args, &invocation.options) {
            Ok(_) => Ok(0),
            Err(err) => report_entry_error(err, traceback, &self.streams),
        }
    }

    /// Parse and execute programmatically. Nothing here ends the process: parse
    /// failures come back as [`CommandError`], help as [`ExitRequest`].
    pub fn call(&mut self, argv: &[String]) -> Result<Option<String>> {
        let invocation = self.parse(argv).map_err(|err| match err {
            ParseError::Exit(request) => anyhow::Error::new(request),
            ParseError::Command(err) => anyhow::Error::new(err),
        })?;
        self.execute(&invocation.args, &invocation.options)
    }

    pub fn execute(&mut self, args: &[Value], options: &Options) -> Result<Option<String>> {
        self.execute_with(args, options, Redirect::default())
    }

    /// Call the handler with `redirect` applied for this call only, then write
    /// any non-empty result to stdout.
    pub fn execute_with(
        &mut self,
        args: &[Value],
        options: &Options,
        redirect: Redirect,
    ) -> Result<Option<String>> {
        let streams = redirect.apply(&self.streams);
        let output = self.command.handle(&streams, args, options)?;
        if let Some(text) = output.as_deref().filter(|text| !text.is_empty()) {
            streams.stdout.write_line(text)?;
        }
        Ok(output)
    }

    fn report_exit_request(&self, request: &ExitRequest) -> Result<ExitCode> {
        if let Some(message) = &request.message {
            let sink = if request.status == 0 {
                &self.streams.stdout
            } else {
                &self.streams.stderr
            };
            sink.write_line(message)?;
        }
        Ok(request.status)
    }
}

fn create_parser(command: &dyn Command, streams: &Streams) -> CommandParser {
    let mut cmd = clap::Command::new(command.name().to_string()).arg(
        Arg::new(TRACEBACK)
            .long(TRACEBACK)
            .action(ArgAction::SetTrue)
            .hide(true)
            .help("raise on command errors instead of reporting them"),
    );
    if !command.help().is_empty() {
        cmd = cmd.about(command.help().to_string());
    }

    let mut parser = CommandParser::new(command.add_arguments(cmd));
    parser.set_missing_args_message(command.missing_args_message().map(str::to_string));
    parser.set_stderr(streams.stderr.clone());
    parser
}

/// Classify an error raised while running a command as the process entry point.
///
/// With `traceback` set, the error is handed back unchanged. Otherwise it is
/// written to stderr and mapped to an exit status: a [`CommandError`] is a
/// handled failure (0), a system check failure and any unexpected error give 1,
/// an [`ExitRequest`] gives its own status.
pub fn report_entry_error(
    err: anyhow::Error,
    traceback: bool,
    streams: &Streams,
) -> Result<ExitCode> {
    if traceback {
        return Err(err);
    }

    if let Some(request) = err.downcast_ref::<ExitRequest>() {
        if let Some(message) = &request.message {
            streams.stdout.write_line(message)?;
        }
        return Ok(request.status);
    }

    match err.downcast_ref::<CommandError>() {
        Some(command_error) if command_error.is_system_check() => {
            debug!("system check failed");
            streams.stderr.write_with(command_error, Some(""))?;
            Ok(1)
        }
        Some(command_error) => {
            debug!(error = %command_error, "command failed");
            streams.stderr.write_line(command_error)?;
            Ok(0)
        }
        None => {
            warn!(error = %err, "unexpected error");
            streams
                .stderr
                .write_line(format!("{}: {}", error_kind(&err), err))?;
            Ok(1)
        }
    }
}
