//! nagcfg cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; nagcfg ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    /// Main configuration file
    ///
    /// Defaults to the first existing one of the well known
    /// locations (/etc/nagios/nagios.cfg, /etc/icinga/icinga.cfg, ...)
    #[clap(short = 'c', long = "config", global(true))]
    pub config: Option<PathBuf>,

    /// Fail on unknown object types instead of reporting them
    #[clap(long = "strict", global(true))]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the object files the main configuration points to
    Files(OutputArgs),

    /// List definitions
    #[command(alias = "ls")]
    List(ListCommand),

    /// Show one definition by its name
    Get(GetCommand),

    /// Show the service of a host
    Service(ServiceCommand),

    /// Set an attribute on every matching definition
    Set(SetCommand),

    /// Remove an attribute from every matching definition
    Unset(UnsetCommand),

    /// Rename an attribute on every matching definition
    Rename(RenameCommand),

    /// Delete matching definitions
    Delete(DeleteCommand),

    /// Show problems found while parsing
    Errors(OutputArgs),
}

#[derive(Parser, Debug)]
pub struct SelectArgs {
    /// Object type (host, service, ...)
    pub object_type: String,

    /// Only definitions matching all filters
    ///
    /// key=value, key__contains=value, key__regex=pattern, ...
    #[clap(short = 'f', long = "filter")]
    pub filters: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct ListCommand {
    /// Object type, all types if omitted
    pub object_type: Option<String>,

    /// Only definitions matching all filters
    ///
    /// key=value, key__contains=value, key__regex=pattern, ...
    #[clap(short = 'f', long = "filter")]
    pub filters: Vec<String>,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct GetCommand {
    /// Object type (host, service, ...)
    pub object_type: String,

    pub name: String,

    /// Attribute to match the name against, defaults to the type's name attribute
    #[clap(short = 'k', long = "key")]
    pub key: Option<String>,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct ServiceCommand {
    pub host_name: String,

    pub service_description: String,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct SetCommand {
    #[clap(flatten)]
    pub select: SelectArgs,

    pub attribute: String,

    pub value: String,
}

#[derive(Parser, Debug)]
pub struct UnsetCommand {
    #[clap(flatten)]
    pub select: SelectArgs,

    pub attribute: String,
}

#[derive(Parser, Debug)]
pub struct RenameCommand {
    #[clap(flatten)]
    pub select: SelectArgs,

    pub attribute: String,

    pub new_name: String,
}

#[derive(Parser, Debug)]
pub struct DeleteCommand {
    #[clap(flatten)]
    pub select: SelectArgs,

    /// Allow deleting more than one definition
    #[clap(long = "all")]
    pub all: bool,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}
