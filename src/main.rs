use argh::FromArgs;
use shell_dispatch::commands;
use shell_dispatch::{
    BaseCommand, EditorSource, LineSource, ReaderSource, Shell, ShellConfig, Streams, logging,
};
use std::io::IsTerminal;

#[derive(FromArgs)]
/// Run one demo command, or start an interactive shell when no command is given.
struct Cli {
    #[argh(option, default = "String::from(\"(Cmd) \")")]
    /// prompt shown by the interactive shell
    prompt: String,

    #[argh(option)]
    /// banner printed when the interactive shell starts
    intro: Option<String>,

    #[argh(switch)]
    /// repeat the previous command when an empty line is entered
    repeat_empty: bool,

    #[argh(switch)]
    /// keep the shell running at end of input
    no_eof_exit: bool,

    #[argh(positional, greedy)]
    /// command to run once, followed by its arguments
    argv: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    logging::init();
    let cli: Cli = argh::from_env();

    if let Some((name, rest)) = cli.argv.split_first() {
        let Some(command) = commands::lookup(name) else {
            eprintln!("Unknown command: {}", name);
            std::process::exit(1);
        };
        let mut command = BaseCommand::from_boxed(command, Streams::default());
        let code = command.run_from_argv(rest)?;
        std::process::exit(code);
    }

    let mut config = ShellConfig::default()
        .prompt(cli.prompt)
        .repeat_empty_line(cli.repeat_empty)
        .exit_on_eof(!cli.no_eof_exit);
    if let Some(intro) = cli.intro {
        config = config.intro(intro);
    }

    let mut shell = Shell::new(config);
    for command in commands::all() {
        shell.register_boxed(command);
    }

    let mut source: Box<dyn LineSource> = if std::io::stdin().is_terminal() {
        Box::new(EditorSource::new()?)
    } else {
        Box::new(ReaderSource::new(std::io::stdin().lock()))
    };
    shell.cmdloop(source.as_mut())
}
