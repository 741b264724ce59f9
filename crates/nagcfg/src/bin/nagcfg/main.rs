mod cli;

use nagcfg::config::Config;
use nagcfg::object::ObjectDefinition;
use nagcfg::query::Predicate;
use nagcfg::tracking::Changeset;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("NAGCFG_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = load(&cli).and_then(|mut config| match cli.command {
        cli::Command::Files(output_cli) => output(&output_cli, config.cfg_files()),
        cli::Command::List(list_cli) => list(&config, list_cli),
        cli::Command::Get(get_cli) => get(&config, get_cli),
        cli::Command::Service(service_cli) => service(&config, service_cli),
        cli::Command::Set(set_cli) => set(&mut config, set_cli),
        cli::Command::Unset(unset_cli) => unset(&mut config, unset_cli),
        cli::Command::Rename(rename_cli) => rename(&mut config, rename_cli),
        cli::Command::Delete(delete_cli) => delete(&mut config, delete_cli),
        cli::Command::Errors(output_cli) => errors(&config, &output_cli),
    });

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

fn load(cli: &cli::Cli) -> anyhow::Result<Config> {
    let config = match &cli.config {
        Some(path) => Config::new(path),
        None => Config::guess()?,
    };
    let mut config = config.strict(cli.strict).with_banner("nagcfg");
    config.add_hook(Box::new(nagcfg::hooks::LoggingHook));
    config.parse()?;

    if !config.issues().is_empty() {
        tracing::warn!(issues = config.issues().len(), "configuration has issues, see `nagcfg errors`");
    }
    Ok(config)
}

fn predicates(filters: &[String]) -> anyhow::Result<Vec<Predicate>> {
    Ok(filters
        .iter()
        .map(|filter| filter.parse::<Predicate>())
        .collect::<Result<_, _>>()?)
}

/// Copies of the definitions a command works on
fn select(config: &Config, select: &cli::SelectArgs) -> anyhow::Result<Vec<ObjectDefinition>> {
    let predicates = predicates(&select.filters)?;
    let selected: Vec<ObjectDefinition> = config
        .store()
        .filter(Some(select.object_type.as_str()), &predicates)
        .into_iter()
        .cloned()
        .collect();

    anyhow::ensure!(
        !selected.is_empty(),
        "No {} definition matches the filters",
        select.object_type
    );
    Ok(selected)
}

pub fn list(config: &Config, cli: cli::ListCommand) -> anyhow::Result<()> {
    let predicates = predicates(&cli.filters)?;
    let objects = config
        .store()
        .filter(cli.object_type.as_deref(), &predicates);
    output(&cli.output, &objects)
}

pub fn get(config: &Config, cli: cli::GetCommand) -> anyhow::Result<()> {
    let Some(object) = config
        .store()
        .get(&cli.object_type, &cli.name, cli.key.as_deref())?
    else {
        anyhow::bail!("No {} named {:?}", cli.object_type, cli.name);
    };
    output(&cli.output, object)
}

pub fn service(config: &Config, cli: cli::ServiceCommand) -> anyhow::Result<()> {
    let Some(service) = config
        .store()
        .get_service(&cli.host_name, &cli.service_description)
    else {
        anyhow::bail!(
            "No service {:?} on host {:?}",
            cli.service_description,
            cli.host_name
        );
    };
    output(&cli.output, service)
}

fn commit(config: &mut Config, changesets: Vec<Changeset>) -> anyhow::Result<()> {
    for changeset in changesets {
        config.stage(changeset);
    }
    let written = config.commit()?;
    eprintln!("{written} definition(s) changed");
    Ok(())
}

pub fn set(config: &mut Config, cli: cli::SetCommand) -> anyhow::Result<()> {
    let changesets = select(config, &cli.select)?
        .iter()
        .map(|object| Changeset::new(object).set(&cli.attribute, &cli.value))
        .collect();
    commit(config, changesets)
}

pub fn unset(config: &mut Config, cli: cli::UnsetCommand) -> anyhow::Result<()> {
    let changesets = select(config, &cli.select)?
        .iter()
        .filter(|object| object.defined_attributes.contains_key(&cli.attribute))
        .map(|object| Changeset::new(object).remove(&cli.attribute))
        .collect();
    commit(config, changesets)
}

pub fn rename(config: &mut Config, cli: cli::RenameCommand) -> anyhow::Result<()> {
    let changesets = select(config, &cli.select)?
        .iter()
        .filter(|object| object.defined_attributes.contains_key(&cli.attribute))
        .map(|object| Changeset::new(object).rename(&cli.attribute, &cli.new_name))
        .collect();
    commit(config, changesets)
}

pub fn delete(config: &mut Config, cli: cli::DeleteCommand) -> anyhow::Result<()> {
    let selected = select(config, &cli.select)?;
    anyhow::ensure!(
        cli.all || selected.len() == 1,
        "{} definitions match, pass --all to delete all of them",
        selected.len()
    );

    for object in &selected {
        config.item_remove(object)?;
    }
    eprintln!("{} definition(s) deleted", selected.len());
    Ok(())
}

pub fn errors(config: &Config, cli: &cli::OutputArgs) -> anyhow::Result<()> {
    let issues: Vec<String> = config.issues().iter().map(ToString::to_string).collect();
    output(cli, &issues)
}

fn output<T: serde::Serialize + ?Sized>(output: &cli::OutputArgs, value: &T) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}
