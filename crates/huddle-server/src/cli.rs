use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "huddle-server", about = "Huddle real-time project chat gateway")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/huddle.toml")]
    pub config: String,

    /// Register a project id in the database and exit
    #[arg(long, value_name = "ID")]
    pub add_project: Option<String>,

    /// Display name for --add-project (defaults to the id)
    #[arg(long, value_name = "NAME", requires = "add_project")]
    pub project_name: Option<String>,
}
