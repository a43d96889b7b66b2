use std::borrow::Cow;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use unidb::config::{load_config, Config, ConnectionConfig};
use unidb::{Arg, DbError, Driver, Result};

const USAGE: &str = "usage: unidb [--config FILE | --default-config] [--json] [--columns] [DATABASE] SQL [ARGS...]
  DATABASE is omitted when a config file is used; an argument of \\N is bound as NULL";

#[derive(Debug, Default, PartialEq)]
struct Options {
    config: Option<PathBuf>,
    json: bool,
    columns: bool,
    positional: Vec<String>,
}

fn parse_args(args: impl Iterator<Item = String>) -> std::result::Result<Options, String> {
    let mut options = Options::default();
    let mut args = args;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or("--config needs a file")?;
                options.config = Some(PathBuf::from(path));
            }
            "--default-config" => {
                options.config = Some(Config::default_path().ok_or("no configuration directory on this platform")?);
            }
            "--json" => options.json = true,
            "--columns" => options.columns = true,
            "--" => {
                options.positional.extend(args.by_ref());
            }
            _ => options.positional.push(arg),
        }
    }
    Ok(options)
}

fn run(options: Options) -> Result<()> {
    let mut positional = options.positional.into_iter();
    let profile = match &options.config {
        Some(path) => load_config(path)?.connection,
        None => ConnectionConfig {
            host: "localhost".to_string(),
            user: String::new(),
            password: String::new(),
            database: positional
                .next()
                .ok_or_else(|| DbError::Config("missing DATABASE".to_string()))?,
            encoding: None,
        },
    };
    let sql = positional
        .next()
        .ok_or_else(|| DbError::Config("missing SQL".to_string()))?;
    let args: Vec<Arg> = positional
        .map(|a| if a == "\\N" { Arg::Null } else { Arg::Text(a) })
        .collect();

    let mut conn = profile.connect()?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let returned_rows = {
        let mut rows = conn.instant_rows_with_columns(sql.as_str(), &args)?;
        let columns = rows.columns().cloned().unwrap_or_default();
        if columns.is_empty() {
            false
        } else {
            if options.columns {
                for column in &columns {
                    writeln!(
                        out,
                        "# {}\t{}\t{}\t{}\t{}\t{}\t{}",
                        column.name,
                        column.table,
                        column.db_type.kind,
                        column.db_type.size,
                        column.db_type.length,
                        if column.db_type.not_null { "NOT NULL" } else { "NULL" },
                        if column.primary_key { "PRIMARY KEY" } else { "" },
                    )?;
                }
            }
            while let Some(row) = rows.next() {
                if options.json {
                    writeln!(out, "{}", serde_json::to_string(&row.to_row())?)?;
                } else {
                    let fields: Vec<Cow<str>> = (0..row.len())
                        .map(|i| row.get(i).unwrap_or(Cow::Borrowed("NULL")))
                        .collect();
                    writeln!(out, "{}", fields.join("\t"))?;
                }
            }
            true
        }
    };

    if !returned_rows {
        let affected = conn.driver().map_or(0, |d| d.affected_rows());
        writeln!(out, "{} row(s) affected", affected)?;
    }
    conn.close();
    Ok(())
}

fn main() -> ExitCode {
    // Logs go to stderr so query output stays clean on stdout
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    info!("Starting unidb...");

    let options = match parse_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(msg) => {
            eprintln!("{}\n{}", msg, USAGE);
            return ExitCode::from(2);
        }
    };
    if options.positional.is_empty() {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    }

    match run(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
