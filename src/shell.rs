//! Interactive read-eval-print loop over a set of registered commands.
//!
//! Unlike [`crate::command::report_entry_error`], the loop never ends on an error:
//! every failure is printed and the next line is read.
use crate::command::{BaseCommand, Command, Streams};
use crate::error::{CommandError, ExitRequest};
use crate::output::OutputSink;
use crate::words::split_words;
use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::collections::BTreeMap;
use std::io::BufRead;
use tracing::{debug, info, warn};

const HELP_HELP: &str = "Type \"help [topic]\" for help on a command,\nor just \"help\" for a list of commands.";
const EXIT_HELP: &str = "Exit the interactive shell.";
const BUILTINS: [&str; 3] = ["exit", "help", "quit"];

/// Result of asking a [`LineSource`] for the next line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLine {
    Line(String),
    /// The user interrupted the prompt (Ctrl-C).
    Interrupted,
    /// End of input.
    Eof,
}

/// Where the loop gets its input from. Reading is the loop's only blocking point.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> Result<ReadLine>;

    /// Whether more input can arrive after [`ReadLine::Eof`], as with Ctrl-D on a
    /// terminal.
    fn can_resume(&self) -> bool {
        false
    }
}

/// Line source backed by a rustyline editor with in-memory history.
pub struct EditorSource {
    editor: DefaultEditor,
}

impl EditorSource {
    pub fn new() -> Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl LineSource for EditorSource {
    fn read_line(&mut self, prompt: &str) -> Result<ReadLine> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    self.editor.add_history_entry(line.as_str())?;
                }
                Ok(ReadLine::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(ReadLine::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadLine::Eof),
            Err(err) => Err(err.into()),
        }
    }

    fn can_resume(&self) -> bool {
        true
    }
}

/// Line source reading from any buffered reader, e.g. piped stdin or a test
/// cursor. The prompt is not echoed.
pub struct ReaderSource<R> {
    reader: R,
}

impl<R: BufRead> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> LineSource for ReaderSource<R> {
    /// Bytes that are not valid UTF-8 are replaced rather than failing the read.
    fn read_line(&mut self, _prompt: &str) -> Result<ReadLine> {
        let mut bytes = Vec::new();
        if self.reader.read_until(b'\n', &mut bytes)? == 0 {
            return Ok(ReadLine::Eof);
        }
        let line = String::from_utf8_lossy(&bytes);
        Ok(ReadLine::Line(line.trim_end_matches(['\n', '\r']).to_string()))
    }
}

/// Behaviour switches of the interactive loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub prompt: String,
    pub intro: Option<String>,
    pub empty_line_repeats_last_command: bool,
    pub eof_exits_command_loop: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: "(Cmd) ".to_string(),
            intro: None,
            empty_line_repeats_last_command: false,
            eof_exits_command_loop: true,
        }
    }
}

impl ShellConfig {
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn intro(mut self, intro: impl Into<String>) -> Self {
        self.intro = Some(intro.into());
        self
    }

    pub fn repeat_empty_line(mut self, repeat: bool) -> Self {
        self.empty_line_repeats_last_command = repeat;
        self
    }

    pub fn exit_on_eof(mut self, exit: bool) -> Self {
        self.eof_exits_command_loop = exit;
        self
    }
}

/// Mutable state of one interactive session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    pub stop: bool,
    pub last_command_failed: bool,
}

/// The interactive dispatch loop.
pub struct Shell {
    config: ShellConfig,
    commands: BTreeMap<String, BaseCommand>,
    streams: Streams,
    state: SessionState,
    last_line: String,
}

impl Shell {
    pub fn new(config: ShellConfig) -> Self {
        Self::with_streams(config, Streams::default())
    }

    pub fn with_streams(config: ShellConfig, streams: Streams) -> Self {
        Self {
            config,
            commands: BTreeMap::new(),
            streams,
            state: SessionState::default(),
            last_line: String::new(),
        }
    }

    /// Register a command under its own name. Registered commands write to the
    /// shell's sinks. A later registration with the same name replaces the earlier.
    pub fn register(&mut self, command: impl Command + 'static) -> &mut Self {
        self.register_boxed(Box::new(command))
    }

    pub fn register_boxed(&mut self, command: Box<dyn Command>) -> &mut Self {
        let command = BaseCommand::from_boxed(command, self.streams.clone());
        self.commands.insert(command.name().to_string(), command);
        self
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn last_command_failed(&self) -> bool {
        self.state.last_command_failed
    }

    /// Names of all registered commands, sorted.
    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Read and dispatch lines until a command asks to stop or input runs out.
    pub fn cmdloop(&mut self, source: &mut dyn LineSource) -> Result<()> {
        info!(commands = self.commands.len(), "starting command loop");
        if let Some(intro) = &self.config.intro {
            self.streams.stdout.write_line(intro)?;
        }

        self.state.stop = false;
        while !self.state.stop {
            let line = match source.read_line(&self.config.prompt)? {
                ReadLine::Line(line) => line,
                ReadLine::Interrupted => continue,
                ReadLine::Eof => {
                    let stop = self.onecmd("EOF");
                    if !stop && !source.can_resume() {
                        debug!("input exhausted");
                        break;
                    }
                    self.state.stop = stop;
                    continue;
                }
            };
            self.state.stop = self.onecmd(&line);
        }

        info!("command loop finished");
        Ok(())
    }

    /// Dispatch one line and classify the outcome. Returns `true` when the loop
    /// should stop.
    pub fn onecmd(&mut self, line: &str) -> bool {
        self.state.last_command_failed = false;
        match self.dispatch(line) {
            Ok(stop) => stop,
            Err(err) => {
                self.state.last_command_failed = report_loop_error(err, &self.streams.stdout);
                false
            }
        }
    }

    fn dispatch(&mut self, line: &str) -> Result<bool> {
        let line = line.trim();
        if line.is_empty() {
            return self.emptyline();
        }
        let line = match line.strip_prefix('?') {
            Some(rest) => format!("help {}", rest),
            None => line.to_string(),
        };
        if line == "EOF" {
            self.last_line.clear();
        } else {
            self.last_line = line.clone();
        }

        let (name, rest) = split_command(&line);
        debug!(command = name, "dispatching line");
        match name {
            "" => Err(no_such_command(&line)),
            "exit" | "quit" => Ok(true),
            "EOF" => self.do_eof(),
            "help" => {
                self.do_help(rest)?;
                Ok(false)
            }
            _ => {
                let command = self.resolve(name, &line)?;
                command.call(&split_words(rest)?)?;
                Ok(false)
            }
        }
    }

    fn emptyline(&mut self) -> Result<bool> {
        if self.config.empty_line_repeats_last_command && !self.last_line.is_empty() {
            let last = self.last_line.clone();
            return self.dispatch(&last);
        }
        Ok(false)
    }

    /// Exact name first, then a unique prefix.
    fn resolve(&mut self, name: &str, line: &str) -> Result<&mut BaseCommand> {
        let mut candidates: Vec<(&String, &mut BaseCommand)> = self
            .commands
            .iter_mut()
            .filter(|(candidate, _)| candidate.starts_with(name))
            .collect();
        if let Some(exact) = candidates.iter().position(|(candidate, _)| candidate.as_str() == name) {
            return Ok(candidates.swap_remove(exact).1);
        }
        if candidates.len() > 1 {
            let names: Vec<&str> = candidates.iter().map(|(candidate, _)| candidate.as_str()).collect();
            return Err(CommandError::new(format!(
                "Ambiguous command: {} ({})",
                name,
                names.join(", ")
            ))
            .into());
        }
        candidates
            .pop()
            .map(|(_, command)| command)
            .ok_or_else(|| no_such_command(line))
    }

    fn do_eof(&self) -> Result<bool> {
        let exits = self.config.eof_exits_command_loop;
        if exits && !self.config.prompt.is_empty() {
            self.streams.stdout.write_with("", Some("\n"))?;
        }
        Ok(exits)
    }

    fn do_help(&self, topic: &str) -> Result<()> {
        let stdout = &self.streams.stdout;
        match topic {
            "" => {
                let (documented, undocumented): (Vec<&BaseCommand>, Vec<&BaseCommand>) =
                    self.commands.values().partition(|c| !c.help().is_empty());
                let mut names: Vec<&str> = documented.iter().map(|c| c.name()).collect();
                names.extend(BUILTINS);
                names.sort_unstable();
                write_topics(stdout, "Documented commands (type help <topic>):", &names)?;

                let names: Vec<&str> = undocumented.iter().map(|c| c.name()).collect();
                if !names.is_empty() {
                    write_topics(stdout, "Undocumented commands:", &names)?;
                }
            }
            "help" => stdout.write_line(HELP_HELP)?,
            "exit" | "quit" => stdout.write_line(EXIT_HELP)?,
            _ => match self.commands.get(topic) {
                Some(command) => stdout.write_line(command.parser().format_help())?,
                None => stdout.write_line(format!("*** No help on {}", topic))?,
            },
        }
        Ok(())
    }
}

fn write_topics(sink: &OutputSink, header: &str, names: &[&str]) -> Result<()> {
    sink.write_line(header)?;
    sink.write_line("=".repeat(header.len()))?;
    sink.write_line(names.join("  "))?;
    sink.write_line("")?;
    Ok(())
}

fn no_such_command(line: &str) -> anyhow::Error {
    CommandError::new(format!("No such command: {}", line)).into()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '/' | '-' | '.')
}

/// Split a line into the command word and the rest of the line.
fn split_command(line: &str) -> (&str, &str) {
    let end = line
        .char_indices()
        .find(|(_, c)| !is_ident_char(*c))
        .map(|(i, _)| i)
        .unwrap_or(line.len());
    (&line[..end], line[end..].trim())
}

/// Classify an error raised while dispatching one interactive line.
///
/// Writes the report to `stdout` and returns whether the line counts as failed.
/// An [`ExitRequest`] fails only with a non-zero status; a [`CommandError`] prints
/// its message; anything else prints the full error chain.
pub fn report_loop_error(err: anyhow::Error, stdout: &OutputSink) -> bool {
    let (report, failed) = if let Some(request) = err.downcast_ref::<ExitRequest>() {
        (request.message.clone(), request.status != 0)
    } else if let Some(command_error) = err.downcast_ref::<CommandError>() {
        debug!(error = %command_error, "command failed");
        (Some(command_error.to_string()), true)
    } else {
        warn!(error = %err, "unexpected error in command loop");
        (Some(format!("{:?}", err)), true)
    };

    if let Some(report) = report {
        if let Err(write_err) = stdout.write_line(report) {
            warn!(error = %write_err, "failed to write error report");
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SharedBuffer;
    use crate::value::{Options, Value};
    use clap::{Arg, value_parser};
    use std::collections::VecDeque;
    use std::io::Cursor;

    struct Echo;

    impl Command for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn help(&self) -> &str {
            "Print the arguments."
        }

        fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
            cmd.arg(Arg::new("words").num_args(0..))
        }

        fn handle(&mut self, _streams: &Streams, args: &[Value], _options: &Options) -> Result<Option<String>> {
            let words: Vec<String> = args.iter().map(Value::to_string).collect();
            Ok(Some(words.join(" ")))
        }
    }

    struct Boom;

    impl Command for Boom {
        fn name(&self) -> &str {
            "boom"
        }

        fn handle(&mut self, _streams: &Streams, _args: &[Value], _options: &Options) -> Result<Option<String>> {
            Err(anyhow::anyhow!("kaboom").context("while exploding"))
        }
    }

    struct Leave;

    impl Command for Leave {
        fn name(&self) -> &str {
            "leave"
        }

        fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
            cmd.arg(Arg::new("status").required(true).value_parser(value_parser!(i64)))
        }

        fn handle(&mut self, _streams: &Streams, args: &[Value], _options: &Options) -> Result<Option<String>> {
            let status = args[0].as_int().unwrap_or_default() as i32;
            Err(ExitRequest::new(status, Some(format!("leaving with {}", status))).into())
        }
    }

    fn shell_with(config: ShellConfig) -> (Shell, SharedBuffer) {
        let (stdout, out) = OutputSink::buffer();
        let (stderr, _) = OutputSink::buffer();
        let mut shell = Shell::with_streams(config, Streams::new(stdout, stderr));
        shell.register(Echo).register(Boom).register(Leave);
        (shell, out)
    }

    fn shell() -> (Shell, SharedBuffer) {
        shell_with(ShellConfig::default())
    }

    #[test]
    fn test_successful_dispatch_clears_failure() {
        let (mut shell, out) = shell();
        assert!(!shell.onecmd("boom"));
        assert!(shell.last_command_failed());

        assert!(!shell.onecmd("echo hello 'big world'"));
        assert!(!shell.last_command_failed());
        assert!(out.contents().ends_with("hello big world\n"));
    }

    #[test]
    fn test_unknown_command_message() {
        let (mut shell, out) = shell();
        assert!(!shell.onecmd("frobnicate now"));
        assert!(shell.last_command_failed());
        assert_eq!(out.contents(), "No such command: frobnicate now\n");
    }

    #[test]
    fn test_line_starting_with_symbol_is_unknown() {
        let (mut shell, out) = shell();
        shell.onecmd("!ls");
        assert_eq!(out.contents(), "No such command: !ls\n");
    }

    #[test]
    fn test_command_error_is_reported_and_loop_continues() {
        let (mut shell, out) = shell();
        assert!(!shell.onecmd("leave"));
        assert!(shell.last_command_failed());
        assert_eq!(
            out.contents(),
            "Error: the following required arguments were not provided: <status>\n"
        );
    }

    #[test]
    fn test_unexpected_error_prints_full_chain() {
        let (mut shell, out) = shell();
        assert!(!shell.onecmd("boom"));
        assert!(shell.last_command_failed());
        let report = out.contents();
        assert!(report.starts_with("while exploding"));
        assert!(report.contains("Caused by:"));
        assert!(report.contains("kaboom"));
    }

    #[test]
    fn test_exit_request_failure_follows_status() {
        let (mut shell, out) = shell();
        assert!(!shell.onecmd("leave 0"));
        assert!(!shell.last_command_failed());
        assert!(!shell.onecmd("leave 4"));
        assert!(shell.last_command_failed());
        assert_eq!(out.contents(), "leaving with 0\nleaving with 4\n");
    }

    #[test]
    fn test_help_request_is_not_a_failure() {
        let (mut shell, out) = shell();
        assert!(!shell.onecmd("echo --help"));
        assert!(!shell.last_command_failed());
        let help = out.contents();
        assert!(help.starts_with("Print the arguments.\n"));
        assert!(help.contains("Usage: echo"));
    }

    #[test]
    fn test_exit_and_quit_stop_the_loop() {
        let (mut shell, _) = shell();
        assert!(shell.onecmd("exit"));
        assert!(shell.onecmd("quit"));
        assert!(!shell.last_command_failed());
    }

    #[test]
    fn test_prefix_resolution() {
        let (mut shell, out) = shell();
        shell.register(Bare("echoes"));

        shell.onecmd("ec x");
        assert_eq!(out.take(), "Ambiguous command: ec (echo, echoes)\n");
        assert!(shell.last_command_failed());

        shell.onecmd("echo x");
        assert_eq!(out.take(), "x\n");

        shell.onecmd("lea 0");
        assert_eq!(out.take(), "leaving with 0\n");
    }

    struct Bare(&'static str);

    impl Command for Bare {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_not_implemented_handler_is_non_fatal() {
        let (mut shell, out) = shell();
        shell.register(Bare("todo"));
        assert!(!shell.onecmd("todo"));
        assert!(shell.last_command_failed());
        assert!(out.contents().contains("does not provide a handle() implementation"));
    }

    #[test]
    fn test_empty_line_is_noop_by_default() {
        let (mut shell, out) = shell();
        shell.onecmd("echo once");
        assert!(!shell.onecmd("   "));
        assert_eq!(out.contents(), "once\n");
    }

    #[test]
    fn test_empty_line_repeats_when_configured() {
        let (mut shell, out) = shell_with(ShellConfig::default().repeat_empty_line(true));
        shell.onecmd("");
        assert_eq!(out.contents(), "");
        shell.onecmd("echo again");
        shell.onecmd("");
        assert_eq!(out.contents(), "again\nagain\n");
    }

    #[test]
    fn test_eof_prints_newline_and_stops() {
        let (mut shell, out) = shell();
        assert!(shell.onecmd("EOF"));
        assert_eq!(out.contents(), "\n");
    }

    #[test]
    fn test_eof_without_prompt_stops_silently() {
        let (mut shell, out) = shell_with(ShellConfig::default().prompt(""));
        assert!(shell.onecmd("EOF"));
        assert_eq!(out.contents(), "");
    }

    #[test]
    fn test_eof_does_not_stop_when_disabled() {
        let (mut shell, out) = shell_with(ShellConfig::default().exit_on_eof(false));
        assert!(!shell.onecmd("EOF"));
        assert_eq!(out.contents(), "");
    }

    #[test]
    fn test_help_topics() {
        let (mut shell, out) = shell();
        assert_eq!(shell.command_names().collect::<Vec<_>>(), ["boom", "echo", "leave"]);
        shell.onecmd("help");
        let listing = out.take();
        assert!(listing.starts_with("Documented commands (type help <topic>):\n"));
        assert!(listing.contains("echo  exit  help  quit"));
        assert!(listing.contains("Undocumented commands:\n"));
        assert!(listing.ends_with("boom  leave\n\n"));

        shell.onecmd("help echo");
        assert!(out.take().contains("Print the arguments."));

        shell.onecmd("? help");
        assert_eq!(out.take(), format!("{}\n", HELP_HELP));

        shell.onecmd("help nothing");
        assert_eq!(out.take(), "*** No help on nothing\n");
        assert!(!shell.last_command_failed());
    }

    #[test]
    fn test_unterminated_quote_is_reported() {
        let (mut shell, out) = shell();
        shell.onecmd("echo \"open");
        assert!(shell.last_command_failed());
        assert_eq!(out.contents(), "Error: No closing quotation\n");
    }

    #[test]
    fn test_cmdloop_runs_until_exit() {
        let (mut shell, out) = shell_with(ShellConfig::default().intro("welcome"));
        let mut source = ReaderSource::new(Cursor::new("echo a\nbogus\n\necho b\nexit\necho never\n"));
        shell.cmdloop(&mut source).unwrap();
        assert_eq!(out.contents(), "welcome\na\nNo such command: bogus\nb\n");
        assert!(shell.state().stop);
    }

    #[test]
    fn test_cmdloop_stops_on_eof() {
        let (mut shell, out) = shell();
        let mut source = ReaderSource::new(Cursor::new("echo a\r\n"));
        shell.cmdloop(&mut source).unwrap();
        assert_eq!(out.contents(), "a\n\n");
        assert!(shell.state().stop);
    }

    #[test]
    fn test_cmdloop_ends_on_exhausted_input_when_eof_does_not_stop() {
        let (mut shell, out) = shell_with(ShellConfig::default().exit_on_eof(false));
        let mut source = ReaderSource::new(Cursor::new("echo a\n"));
        shell.cmdloop(&mut source).unwrap();
        assert_eq!(out.contents(), "a\n");
        assert!(!shell.state().stop);
    }

    #[test]
    fn test_cmdloop_replaces_invalid_utf8() {
        let (mut shell, out) = shell();
        let mut source = ReaderSource::new(Cursor::new(b"echo a\necho \xff\necho ok\n".to_vec()));
        shell.cmdloop(&mut source).unwrap();
        assert_eq!(out.contents(), "a\n\u{fffd}\nok\n\n");
        assert!(!shell.last_command_failed());
    }

    /// Replays a fixed list of reads, like a terminal where Ctrl-D does not end
    /// the session.
    struct Scripted {
        reads: VecDeque<ReadLine>,
    }

    impl Scripted {
        fn new(reads: Vec<ReadLine>) -> Self {
            Self { reads: reads.into() }
        }
    }

    impl LineSource for Scripted {
        fn read_line(&mut self, _prompt: &str) -> Result<ReadLine> {
            self.reads
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }

        fn can_resume(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_cmdloop_skips_interrupt_and_keeps_reading_after_eof() {
        let (mut shell, out) = shell_with(ShellConfig::default().exit_on_eof(false));
        let mut source = Scripted::new(vec![
            ReadLine::Interrupted,
            ReadLine::Line("echo a".to_string()),
            ReadLine::Eof,
            ReadLine::Line("echo b".to_string()),
            ReadLine::Line("exit".to_string()),
            ReadLine::Line("echo never".to_string()),
        ]);
        shell.cmdloop(&mut source).unwrap();
        assert_eq!(out.contents(), "a\nb\n");
        assert!(shell.state().stop);
        assert_eq!(source.reads.len(), 1);
    }

    #[test]
    fn test_cmdloop_interrupt_then_eof_stops() {
        let (mut shell, out) = shell();
        let mut source = Scripted::new(vec![ReadLine::Interrupted, ReadLine::Eof]);
        shell.cmdloop(&mut source).unwrap();
        assert_eq!(out.contents(), "\n");
        assert!(shell.state().stop);
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("echo  a b "), ("echo", "a b"));
        assert_eq!(split_command("run-it/x.y"), ("run-it/x.y", ""));
        assert_eq!(split_command("!ls"), ("", "!ls"));
    }
}
