//! Demo commands shipped with the binary.
use crate::command::{Command, Streams};
use crate::error::CommandError;
use crate::value::{Options, Value};
use anyhow::Result;
use clap::{Arg, ArgAction, value_parser};
use std::path::Path;

/// Write the arguments to standard output, separated by spaces.
pub struct Echo;

impl Command for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn help(&self) -> &str {
        "Write the arguments to standard output, separated by spaces."
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            Arg::new("no_newline")
                .short('n')
                .long("no-newline")
                .action(ArgAction::SetTrue)
                .help("do not output the trailing newline"),
        )
        .arg(Arg::new("words").num_args(0..).help("values to print as-is"))
    }

    fn handle(&mut self, streams: &Streams, args: &[Value], options: &Options) -> Result<Option<String>> {
        let words: Vec<String> = args.iter().map(Value::to_string).collect();
        let text = words.join(" ");
        if options.get("no_newline").and_then(Value::as_bool).unwrap_or(false) {
            streams.stdout.write_with(text, Some(""))?;
            return Ok(None);
        }
        Ok(Some(text))
    }
}

pub struct Greet;

impl Command for Greet {
    fn name(&self) -> &str {
        "greet"
    }

    fn help(&self) -> &str {
        "Greet someone by name."
    }

    fn missing_args_message(&self) -> Option<&str> {
        Some("Enter a name to greet.")
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(Arg::new("name").required(true).help("who to greet"))
            .arg(
                Arg::new("greeting")
                    .short('g')
                    .long("greeting")
                    .default_value("Hello")
                    .help("greeting word"),
            )
            .arg(
                Arg::new("shout")
                    .long("shout")
                    .action(ArgAction::SetTrue)
                    .help("print in capitals"),
            )
    }

    fn handle(&mut self, _streams: &Streams, args: &[Value], options: &Options) -> Result<Option<String>> {
        let name = args.first().and_then(Value::as_str).unwrap_or_default();
        if name.trim().is_empty() {
            return Err(CommandError::new("Name must not be blank.").into());
        }
        let greeting = options.get("greeting").and_then(Value::as_str).unwrap_or("Hello");
        let text = format!("{}, {}!", greeting, name);
        if options.get("shout").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(Some(text.to_uppercase()));
        }
        Ok(Some(text))
    }
}

pub struct Sum;

impl Command for Sum {
    fn name(&self) -> &str {
        "sum"
    }

    fn help(&self) -> &str {
        "Add up integers."
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            Arg::new("numbers")
                .value_name("N")
                .required(true)
                .num_args(1..)
                .allow_negative_numbers(true)
                .value_parser(value_parser!(i64)),
        )
        .arg(
            Arg::new("start")
                .long("start")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(i64))
                .default_value("0")
                .help("value to start from"),
        )
    }

    fn handle(&mut self, _streams: &Streams, args: &[Value], options: &Options) -> Result<Option<String>> {
        let start = options.get("start").and_then(Value::as_int).unwrap_or(0);
        let total = args
            .iter()
            .filter_map(Value::as_int)
            .try_fold(start, i64::checked_add)
            .ok_or_else(|| anyhow::anyhow!("integer overflow while adding"))?;
        Ok(Some(total.to_string()))
    }
}

/// Verifies that the given paths exist and reports every missing one at once.
pub struct Check;

impl Command for Check {
    fn name(&self) -> &str {
        "check"
    }

    fn help(&self) -> &str {
        "Check that paths exist."
    }

    fn missing_args_message(&self) -> Option<&str> {
        Some("Give at least one path to check.")
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(Arg::new("paths").required(true).num_args(1..))
    }

    fn handle(&mut self, _streams: &Streams, args: &[Value], _options: &Options) -> Result<Option<String>> {
        let missing: Vec<&str> = args
            .iter()
            .filter_map(Value::as_str)
            .filter(|path| !Path::new(path).exists())
            .collect();
        if missing.is_empty() {
            return Ok(Some(format!(
                "System check identified no issues ({} checked).",
                args.len()
            )));
        }

        let mut report = String::from("SystemCheckError: System check identified some issues:\n\nERRORS:\n");
        for path in &missing {
            report.push_str(&format!("?: (paths.E001) {} does not exist.\n", path));
        }
        let plural = if missing.len() == 1 { "issue" } else { "issues" };
        report.push_str(&format!(
            "\nSystem check identified {} {}.\n",
            missing.len(),
            plural
        ));
        Err(CommandError::system_check(report).into())
    }
}

/// All demo commands, in registration order.
pub fn all() -> Vec<Box<dyn Command>> {
    vec![Box::new(Echo), Box::new(Greet), Box::new(Sum), Box::new(Check)]
}

/// Demo command with exactly this name.
pub fn lookup(name: &str) -> Option<Box<dyn Command>> {
    all().into_iter().find(|command| command.name() == name)
}
