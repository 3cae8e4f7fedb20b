//! TabulaDB - CLI Client

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, ValueEnum};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tabuladb::catalog::SearchPredicate;
use tabuladb::executor::ResultRow;
use tabuladb::{DataType, Database, EngineConfig, IndexKind, StrategyPreference, TableBuilder};

/// TabulaDB interactive shell
#[derive(Parser, Debug)]
#[command(
    name = "tabula-cli",
    author = "TabulaDB Team",
    version,
    about = "Interactive shell for the TabulaDB in-memory table engine"
)]
struct Args {
    /// Branching factor of B+ tree indexes
    #[arg(long, value_name = "ORDER")]
    btree_order: Option<usize>,

    /// Row count below which joins use nested loop
    #[arg(long, value_name = "ROWS")]
    join_threshold: Option<usize>,

    /// Join strategy used by queries
    #[arg(long, value_enum)]
    join_strategy: Option<StrategyArg>,

    /// Engine configuration file (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Execute a single SQL query and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Load the demo tables on startup
    #[arg(long)]
    demo: bool,

    /// Enable debug logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Auto,
    NestedLoop,
    HashJoin,
}

impl From<StrategyArg> for StrategyPreference {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Auto => StrategyPreference::Auto,
            StrategyArg::NestedLoop => StrategyPreference::NestedLoop,
            StrategyArg::HashJoin => StrategyPreference::HashJoin,
        }
    }
}

/// Print welcome banner
fn print_banner() {
    println!(
        r#"
 _____     _           _       ____  ____
|_   _|_ _| |__  _   _| | __ _|  _ \| __ )
  | |/ _` | '_ \| | | | |/ _` | | | |  _ \
  | | (_| | |_) | |_| | | (_| | |_| | |_) |
  |_|\__,_|_.__/ \__,_|_|\__,_|____/|____/

 An in-memory relational table engine in Rust
 Type '.help' for help, '.quit' to exit
"#
    );
}

/// Print help message
fn print_help() {
    println!(
        r#"
Commands:
  .help                                  Show this help message
  .quit                                  Exit TabulaDB
  .tables                                List all tables
  .schema [table]                        Show table schema
  .rows <table>                          Show rows with their positions
  .create <table> <col:TYPE[:pk]>...     Create a table (INTEGER, STRING, DOUBLE)
  .insert <table> <col=value>...         Insert a row
  .delete <table> <position>             Delete the row at a position
  .index <table> <column> <btree|hash>   Create an index
  .dropindex <table> <column> <kind>     Drop an index
  .drop <table>                          Drop a table
  .search <table> <column> <value>       Exact lookup
  .search <table> <column> <min>..<max>  Inclusive range lookup (either end may be empty)
  .bench <left> <right> <lcol> <rcol>    Compare join strategies
  .config                                Show the engine settings
  .demo                                  Load the demo tables
  .clear                                 Clear screen

SQL:
  SELECT cols FROM t [[INNER|LEFT|RIGHT|FULL [OUTER]] JOIN u ON t.a = u.b]
    [WHERE col <op> literal] [ORDER BY col [ASC|DESC]] [LIMIT n];

Examples:
  SELECT name, age FROM users WHERE age > 25;
  SELECT users.name, orders.amount FROM users JOIN orders ON users.id = orders.user_id;
"#
    );
}

fn cell_text(cell: &Option<tabuladb::Cell>) -> String {
    match cell {
        Some(cell) => cell.to_string(),
        None => "NULL".to_string(),
    }
}

/// Format query results as a table
fn format_results(columns: &[String], rows: &[ResultRow]) -> String {
    if columns.is_empty() && rows.is_empty() {
        return String::new();
    }

    let rendered: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    // Calculate column widths
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &rendered {
        for (i, value) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(value.chars().count());
            }
        }
    }

    let mut output = String::new();

    let separator: String = widths
        .iter()
        .map(|w| "-".repeat(*w + 2))
        .collect::<Vec<_>>()
        .join("+");
    let separator = format!("+{}+\n", separator);

    // Header
    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!(" {:^width$} ", c, width = *w))
        .collect::<Vec<_>>()
        .join("|");
    output.push_str(&format!("|{}|\n", header));
    output.push_str(&separator);

    // Rows
    for row in &rendered {
        let row_str: String = row
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!(" {:>width$} ", v, width = *w))
            .collect::<Vec<_>>()
            .join("|");
        output.push_str(&format!("|{}|\n", row_str));
    }

    if !rows.is_empty() {
        output.push_str(&separator);
    }

    output.push_str(&format!("{} row(s) returned\n", rows.len()));

    output
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Shell state
struct Shell {
    db: Database,
    json: bool,
}

impl Shell {
    /// Execute a SQL query
    fn execute_sql(&self, sql: &str) -> Result<()> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Ok(());
        }

        let result = self.db.execute_query(sql)?;
        if self.json {
            return print_json(&result);
        }

        print!("{}", format_results(&result.columns, &result.rows));
        let strategy = match result.plan.join_strategy {
            Some(strategy) => format!(", {}", strategy),
            None => String::new(),
        };
        println!(
            "({:.3} ms, {}{})",
            result.elapsed_millis(),
            result.plan.access_path,
            strategy
        );
        Ok(())
    }

    fn show_schema(&self, table: &str) -> Result<()> {
        let info = self.db.describe_table(table)?;
        if self.json {
            return print_json(&info);
        }

        println!("Table: {} ({} rows)", info.name, info.row_count);
        for column in &info.columns {
            let pk = if column.primary_key { " PRIMARY KEY" } else { "" };
            println!("  {} {}{}", column.name, column.data_type, pk);
        }
        for index in &info.indexes {
            println!("  INDEX {} ON {}", index.kind, index.column);
        }
        Ok(())
    }

    fn show_rows(&self, table: &str) -> Result<()> {
        let schema = self.db.get_table_schema(table)?;
        let rows = self.db.rows(table)?;
        if self.json {
            return print_json(&rows);
        }

        let mut columns = vec!["#".to_string()];
        columns.extend(schema.column_names().into_iter().map(str::to_string));
        let rows: Vec<ResultRow> = rows
            .into_iter()
            .enumerate()
            .map(|(position, row)| {
                let mut cells = vec![Some(tabuladb::Cell::Integer(position as i64))];
                cells.extend(row.into_cells().into_iter().map(Some));
                cells
            })
            .collect();
        print!("{}", format_results(&columns, &rows));
        Ok(())
    }

    /// `.create users id:INTEGER:pk name:STRING`
    fn create_table(&self, table: &str, specs: &[&str]) -> Result<()> {
        let mut builder = TableBuilder::new(table);
        for spec in specs {
            let mut parts = spec.split(':');
            let name = parts.next().filter(|n| !n.is_empty());
            let data_type = parts.next();
            let (Some(name), Some(data_type)) = (name, data_type) else {
                bail!("expected <column>:<TYPE>[:pk], got '{}'", spec);
            };
            let data_type: DataType = data_type.parse()?;
            builder = match parts.next() {
                Some(flag) if flag.eq_ignore_ascii_case("pk") => builder.primary_key(name, data_type),
                Some(flag) => bail!("unknown column flag '{}'", flag),
                None => builder.column(name, data_type),
            };
        }
        builder.build(&self.db)?;
        println!("Table '{}' created", table);
        Ok(())
    }

    /// `.insert users id=4 name=Dan age=31`
    fn insert_row(&self, table: &str, assignments: &[&str]) -> Result<()> {
        let values = assignments
            .iter()
            .map(|pair| {
                pair.split_once('=')
                    .ok_or_else(|| anyhow!("expected <column>=<value>, got '{}'", pair))
            })
            .collect::<Result<Vec<_>>>()?;
        let position = self.db.insert_row(table, values)?;
        println!("Inserted at position {}", position);
        Ok(())
    }

    fn search(&self, table: &str, column: &str, value: &str) -> Result<()> {
        let predicate = match value.split_once("..") {
            Some((min, max)) => SearchPredicate::Range {
                min: Some(min).filter(|v| !v.is_empty()).map(str::to_string),
                max: Some(max).filter(|v| !v.is_empty()).map(str::to_string),
            },
            None => SearchPredicate::Exact(value.to_string()),
        };

        let result = self.db.search(table, column, &predicate)?;
        if self.json {
            return print_json(&result);
        }
        for (position, row) in result.positions.iter().zip(&result.rows) {
            let cells: Vec<String> = row.cells().iter().map(|c| c.to_string()).collect();
            println!("  [{}] {}", position, cells.join(", "));
        }
        println!(
            "{} row(s) via {} ({:.3} ms)",
            result.rows.len(),
            result.index_used,
            result.elapsed.as_secs_f64() * 1000.0
        );
        Ok(())
    }

    fn bench(&self, left: &str, right: &str, left_column: &str, right_column: &str) -> Result<()> {
        let report = self.db.benchmark_join(left, right, left_column, right_column)?;
        if self.json {
            return print_json(&report);
        }
        println!("Nested loop: {:.3} ms", report.nested_loop_millis);
        println!("Hash join:   {:.3} ms", report.hash_join_millis);
        println!("Rows:        {}", report.rows);
        Ok(())
    }

    /// Handle special dot commands; returns false to quit
    fn handle_special_command(&self, cmd: &str) -> Result<bool> {
        let parts: Vec<&str> = cmd.split_whitespace().collect();

        match parts.as_slice() {
            [".help"] => print_help(),
            [".quit"] | [".exit"] => return Ok(false),
            [".tables"] => {
                let tables = self.db.list_tables();
                if tables.is_empty() {
                    println!("No tables found.");
                } else {
                    println!("Tables:");
                    for table in tables {
                        println!("  {}", table);
                    }
                }
            }
            [".schema"] => {
                for table in self.db.list_tables() {
                    self.show_schema(&table)?;
                }
            }
            [".schema", table] => self.show_schema(table)?,
            [".rows", table] => self.show_rows(table)?,
            [".create", table, specs @ ..] if !specs.is_empty() => self.create_table(table, specs)?,
            [".insert", table, values @ ..] if !values.is_empty() => self.insert_row(table, values)?,
            [".delete", table, position] => {
                let position: usize = position
                    .parse()
                    .with_context(|| format!("invalid row position '{}'", position))?;
                let row = self.db.delete_row(table, position)?;
                let cells: Vec<String> = row.cells().iter().map(|c| c.to_string()).collect();
                println!("Deleted row {}: {}", position, cells.join(", "));
            }
            [".index", table, column, kind] => {
                let kind: IndexKind = kind.parse()?;
                self.db.create_index(table, column, kind)?;
                println!("Created {} index on {}.{}", kind, table, column);
            }
            [".dropindex", table, column, kind] => {
                let kind: IndexKind = kind.parse()?;
                self.db.drop_index(table, column, kind)?;
                println!("Dropped {} index on {}.{}", kind, table, column);
            }
            [".drop", table] => {
                self.db.drop_table(table)?;
                println!("Table '{}' dropped", table);
            }
            [".search", table, column, value] => self.search(table, column, value)?,
            [".bench", left, right, left_column, right_column] => {
                self.bench(left, right, left_column, right_column)?
            }
            [".config"] => print_json(self.db.config())?,
            [".demo"] => {
                load_demo(&self.db)?;
                println!("Loaded demo tables 'users' and 'orders'");
            }
            [".clear"] => {
                // Clear screen (ANSI escape code)
                print!("\x1B[2J\x1B[1;1H");
                io::stdout().flush()?;
            }
            [cmd, ..] => {
                eprintln!("Unknown command or wrong arguments: {}", cmd);
                eprintln!("Type '.help' for available commands.");
            }
            [] => {}
        }
        Ok(true)
    }
}

/// Demo tables: users and their orders
fn load_demo(db: &Database) -> tabuladb::Result<()> {
    TableBuilder::new("users")
        .primary_key("id", DataType::Integer)
        .column("name", DataType::String)
        .column("age", DataType::Integer)
        .build(db)?;
    for (id, name, age) in [("1", "Alice", "25"), ("2", "Bob", "30"), ("3", "Carol", "28")] {
        db.insert_row("users", [("id", id), ("name", name), ("age", age)])?;
    }

    TableBuilder::new("orders")
        .primary_key("order_id", DataType::Integer)
        .column("user_id", DataType::Integer)
        .column("amount", DataType::Double)
        .build(db)?;
    for (order_id, user_id, amount) in [("101", "1", "99.99"), ("102", "2", "149.50"), ("103", "1", "29.99")] {
        db.insert_row(
            "orders",
            [("order_id", order_id), ("user_id", user_id), ("amount", amount)],
        )?;
    }
    Ok(())
}

/// Main REPL loop
fn run_repl(shell: &Shell) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    print_banner();

    let mut input_buffer = String::new();

    loop {
        let prompt = if input_buffer.is_empty() { "tabula> " } else { "   ...> " };
        let line = match editor.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                input_buffer.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let trimmed = line.trim();
        if !trimmed.is_empty() {
            let _ = editor.add_history_entry(trimmed);
        }

        // Handle special commands
        if input_buffer.is_empty() && trimmed.starts_with('.') {
            match shell.handle_special_command(trimmed) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => eprintln!("Error: {}", e),
            }
            continue;
        }

        if trimmed.is_empty() {
            if input_buffer.is_empty() {
                continue;
            }
        } else {
            input_buffer.push_str(&line);
            input_buffer.push('\n');
            // Statement completes at a semicolon
            if !trimmed.ends_with(';') {
                continue;
            }
        }

        let sql = std::mem::take(&mut input_buffer);
        if let Err(e) = shell.execute_sql(&sql) {
            eprintln!("Error: {}", e);
        }
    }

    println!("Goodbye!");
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "tabuladb=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            EngineConfig::from_json(&json)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    // Command line flags override the file
    if let Some(order) = args.btree_order {
        config = config.with_btree_order(order);
    }
    if let Some(threshold) = args.join_threshold {
        config = config.with_nested_loop_threshold(threshold);
    }
    if let Some(strategy) = args.join_strategy {
        config = config.with_join_strategy(strategy.into());
    }
    Ok(config)
}

fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(&args)?;
    info!(?config, "starting shell");

    let shell = Shell {
        db: Database::with_config(config),
        json: args.json,
    };
    if args.demo {
        load_demo(&shell.db)?;
    }

    match &args.command {
        Some(sql) => shell.execute_sql(sql),
        None => run_repl(&shell),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
