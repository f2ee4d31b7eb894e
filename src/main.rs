use plantdb::catalog::{self, FieldSpec};
use plantdb::config::{self, DEFAULT_PROFILE};
use plantdb::{DbError, LimitPolicy, Query, Result};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: plantdb <profile> tables
       plantdb <profile> describe <table>
       plantdb <profile> query <table> [limit]
       plantdb <profile> sql <statement>
       plantdb fields [category]";

#[derive(Debug, PartialEq)]
enum Command {
    Tables,
    Describe(String),
    Query { table: String, limit: LimitPolicy },
    Sql(String),
    Fields(Option<String>),
}

fn parse_args(args: &[String]) -> std::result::Result<(String, Command), String> {
    if args.first().map(String::as_str) == Some("fields") {
        return Ok((DEFAULT_PROFILE.to_string(), Command::Fields(args.get(1).cloned())));
    }

    let (profile, rest) = match args.split_first() {
        Some((profile, rest)) if !rest.is_empty() => (profile.clone(), rest),
        _ => return Err("missing profile or command".to_string()),
    };

    let command = match (rest[0].as_str(), &rest[1..]) {
        ("tables", []) => Command::Tables,
        ("describe", [table]) => Command::Describe(table.clone()),
        ("query", [table]) => Command::Query {
            table: table.clone(),
            limit: LimitPolicy::All,
        },
        ("query", [table, limit]) => {
            let n = limit
                .parse::<u64>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| format!("limit must be a positive number, got {:?}", limit))?;
            Command::Query {
                table: table.clone(),
                limit: LimitPolicy::Top(n),
            }
        }
        ("sql", statement) if !statement.is_empty() => Command::Sql(statement.join(" ")),
        (other, _) => return Err(format!("unknown or incomplete command: {}", other)),
    };
    Ok((profile, command))
}

fn run(profile: &str, command: Command) -> Result<String> {
    let config = config::load_default_config()?;
    catalog::install_field_catalog(config.fields.clone());

    if let Command::Fields(category) = &command {
        let catalog = catalog::field_catalog();
        let fields: Vec<&FieldSpec> = match category {
            Some(category) => catalog.category(category).collect(),
            None => catalog.specs().iter().collect(),
        };
        return Ok(serde_json::to_string_pretty(&fields)?);
    }

    let mut client = config::connect_profile(&config, profile)?;
    let output = match command {
        Command::Tables => serde_json::to_value(client.list_tables()?.into_result()?)?,
        Command::Describe(table) => serde_json::to_value(client.describe_table(&table)?.into_result()?)?,
        Command::Query { table, limit } => {
            let query = Query::table(table).limit(limit);
            serde_json::to_value(client.query(&query)?.into_result()?)?
        }
        Command::Sql(statement) => serde_json::to_value(client.execute_raw(&statement)?.into_result()?)?,
        Command::Fields(_) => return Err(DbError::precondition("fields is handled before connecting")),
    };
    client.close();
    Ok(serde_json::to_string_pretty(&output)?)
}

fn main() -> ExitCode {
    // Initialize the logging system using tracing subscriber; stdout carries the JSON output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (profile, command) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("{}\n{}", message, USAGE);
            return ExitCode::from(2);
        }
    };

    info!("Starting plantdb {:?} on profile {}", command, profile);
    match run(&profile, command) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("plantdb: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_args(&args(&["default", "tables"])).unwrap(),
            ("default".to_string(), Command::Tables)
        );
        assert_eq!(
            parse_args(&args(&["scada", "query", "persons", "3"])).unwrap().1,
            Command::Query {
                table: "persons".to_string(),
                limit: LimitPolicy::Top(3)
            }
        );
        assert_eq!(
            parse_args(&args(&["default", "sql", "SHOW", "TABLES"])).unwrap().1,
            Command::Sql("SHOW TABLES".to_string())
        );
        assert_eq!(
            parse_args(&args(&["fields", "出水参数"])).unwrap().1,
            Command::Fields(Some("出水参数".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_incomplete_commands() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["default"])).is_err());
        assert!(parse_args(&args(&["default", "describe"])).is_err());
        assert!(parse_args(&args(&["default", "query", "t", "many"])).is_err());
        assert!(parse_args(&args(&["default", "query", "t", "0"])).is_err());
        assert!(parse_args(&args(&["default", "drop", "t"])).is_err());
    }
}
