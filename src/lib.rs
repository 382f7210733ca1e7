//! A small framework for defining commands and running them either as one-shot
//! process entry points or as lines typed into an interactive shell.
//!
//! A command implements [`Command`]: it declares its arguments on a runtime
//! [`clap::Command`] and provides a `handle` method. [`BaseCommand`] wraps it with
//! parsing, output and error reporting. [`Shell`] dispatches input lines to
//! registered commands and keeps running whatever goes wrong.
//!
//! The two invocation styles report errors differently. As the process entry
//! point ([`BaseCommand::run_from_argv`]) an unexpected error yields a non-zero
//! exit status; inside the [`Shell`] every error is printed and the loop
//! continues. Parsing never ends the process unless the command is the process.
//!
//! Example
//! ```
//! use clap::Arg;
//! use shell_dispatch::{BaseCommand, Command, Options, Streams, Value};
//!
//! struct Hello;
//!
//! impl Command for Hello {
//!     fn name(&self) -> &str {
//!         "hello"
//!     }
//!
//!     fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
//!         cmd.arg(Arg::new("name").required(true))
//!     }
//!
//!     fn handle(
//!         &mut self,
//!         _streams: &Streams,
//!         args: &[Value],
//!         _options: &Options,
//!     ) -> anyhow::Result<Option<String>> {
//!         Ok(Some(format!("hello, {}", args[0])))
//!     }
//! }
//!
//! let mut cmd = BaseCommand::new(Hello);
//! assert!(cmd.call(&[]).is_err());
//! let output = cmd.call(&["world".to_string()]).unwrap();
//! assert_eq!(output.as_deref(), Some("hello, world"));
//! ```

pub mod command;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
pub mod parser;
pub mod shell;
pub mod value;
mod words;

pub use command::{BaseCommand, Command, Redirect, Streams, report_entry_error};
pub use error::{CommandError, CommandErrorKind, ExitCode, ExitRequest, NotImplemented, ParseError};
pub use output::{OutputSink, SharedBuffer};
pub use parser::{CommandParser, FailurePolicy};
pub use shell::{EditorSource, LineSource, ReadLine, ReaderSource, SessionState, Shell, ShellConfig, report_loop_error};
pub use value::{Options, ParsedInvocation, Value};
pub use words::split_words;
