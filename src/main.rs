use anyhow::Result;
use auteur::build::build_site;
use auteur::config::Project;
use auteur::logging;
use auteur::registry::{self, Registry};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::{error, info};

fn main() {
    let matches = App::new("auteur")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Create an entire blog website from simple Markdown files.")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("debug")
                .short("d")
                .long("debug")
                .help("Show debug output"),
        )
        .arg(
            Arg::with_name("project")
                .short("p")
                .long("project")
                .takes_value(true)
                .value_name("DIR")
                .help("The project directory (default: the nearest enclosing project)"),
        )
        .subcommand(
            SubCommand::with_name("add")
                .about("Add an article to the blog.")
                .arg(
                    Arg::with_name("path")
                        .required(true)
                        .value_name("PATH")
                        .help("The post's Markdown file or directory"),
                ),
        )
        .subcommand(
            SubCommand::with_name("build")
                .about("Build or rebuild the entire blog website.")
                .arg(
                    Arg::with_name("output")
                        .short("o")
                        .long("output")
                        .takes_value(true)
                        .value_name("DIR")
                        .help("The output directory (default: `site` in the project)"),
                ),
        )
        .subcommand(SubCommand::with_name("list").about("List the registered articles in order."))
        .get_matches();

    logging::init(matches.is_present("debug"));

    if let Err(e) = run(&matches) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let project = match matches.value_of("project") {
        Some(dir) => Project::new(cwd.join(dir)),
        None => Project::discover(&cwd)?,
    };

    match matches.subcommand() {
        ("add", Some(sub)) => {
            // `path` is required, so clap won't get us here without it.
            let path = sub.value_of("path").unwrap_or_default();
            let entry = registry::add(&project, &cwd.join(path))?;
            info!(
                "Added `{}`; run `auteur build` to publish it",
                entry.display()
            );
        }
        ("build", Some(sub)) => {
            let output = match sub.value_of("output") {
                Some(dir) => cwd.join(dir),
                None => project.default_output_directory(),
            };
            let site = build_site(&project, &output)?;
            info!(
                "Built {} post(s) into `{}`",
                site.posts.len(),
                site.directory.display()
            );
        }
        ("list", Some(_)) => {
            for entry in Registry::load(&project)?.list() {
                println!("{}", entry.display());
            }
        }
        (name, _) => anyhow::bail!("Unknown command `{}`; see `auteur --help`", name),
    }
    Ok(())
}
