use anyhow::{Context, Result, bail};
use async_std::io::stdin;
use chrono::{Local, NaiveDate};
use clap::{Arg, ArgMatches, Command};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thuchi::config::{Config, DEFAULT_CONFIG_FILE};
use thuchi::materials::{MaterialLine, Materials};
use thuchi::money::Money;
use thuchi::report::{Report, Window, build_settlement_report, export, verify};
use thuchi::session::{SessionState, Sheet, hash_password};
use thuchi::store::FileStore;
use thuchi::transaction::{self, Kind, NewTransaction, Transaction, parse_date};
use thuchi::{Ledger, lines, logging, materials};

fn transaction_args(command: Command<'static>) -> Command<'static> {
    command
        .arg(
            Arg::new("date")
                .short('d')
                .long("date")
                .help("Date as YYYY-MM-DD or DD/MM/YYYY, defaults to today")
                .value_name("DATE")
                .takes_value(true),
        )
        .arg(
            Arg::new("kind")
                .short('k')
                .long("kind")
                .help("Thu (income) or Chi (expense)")
                .value_name("KIND")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::new("amount")
                .short('a')
                .long("amount")
                .help("Amount in dong, e.g. 1.500.000")
                .value_name("AMOUNT")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::new("description")
                .short('m')
                .long("description")
                .help("What the money was for")
                .value_name("TEXT")
                .takes_value(true)
                .required(true),
        )
}

fn id_arg() -> Arg<'static> {
    Arg::new("id")
        .help("Row number as shown by list")
        .value_name("ID")
        .required(true)
        .index(1)
}

fn cli() -> Command<'static> {
    Command::new("thuchi")
        .version("0.1.0")
        .author("Luke Nimtz <luke.nimtz@gmail.com>")
        .about("Income and expense ledger with settlement reports")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Config file")
                .value_name("FILE")
                .default_value(DEFAULT_CONFIG_FILE)
                .takes_value(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Debug logging"),
        )
        .subcommand(
            transaction_args(Command::new("add").about("Records a transaction")).arg(
                Arg::new("receipt")
                    .short('r')
                    .long("receipt")
                    .help("Receipt image to upload")
                    .value_name("FILE")
                    .takes_value(true),
            ),
        )
        .subcommand(transaction_args(
            Command::new("edit")
                .about("Overwrites a transaction, keeping its receipt")
                .arg(id_arg()),
        ))
        .subcommand(
            Command::new("delete")
                .about("Deletes a transaction")
                .arg(id_arg()),
        )
        .subcommand(Command::new("list").about("Lists transactions, newest first"))
        .subcommand(Command::new("balance").about("Shows the current balance"))
        .subcommand(
            Command::new("settle")
                .about("Shows a settlement report")
                .arg(
                    Arg::new("from")
                        .long("from")
                        .help("First day of the window")
                        .value_name("DATE")
                        .takes_value(true)
                        .requires("to"),
                )
                .arg(
                    Arg::new("to")
                        .long("to")
                        .help("Last day of the window")
                        .value_name("DATE")
                        .takes_value(true)
                        .requires("from"),
                )
                .arg(
                    Arg::new("since zero")
                        .long("since-zero")
                        .help("Forgets the saved window and reports since the last zero balance")
                        .conflicts_with("from"),
                )
                .arg(
                    Arg::new("export")
                        .short('o')
                        .long("export")
                        .help("Also writes the report as a workbook")
                        .value_name("FILE")
                        .takes_value(true),
                ),
        )
        .subcommand(
            Command::new("import")
                .about("Appends 'date | kind | amount | description' lines")
                .arg(
                    Arg::new("path")
                        .help("File or directory of lines, or '-' for stdin")
                        .value_name("PATH")
                        .default_value("-")
                        .index(1),
                ),
        )
        .subcommand(
            Command::new("login")
                .about("Starts a session")
                .arg(Arg::new("user").value_name("USER").required(true).index(1))
                .arg(
                    Arg::new("password")
                        .short('p')
                        .long("password")
                        .help("Read from stdin when missing")
                        .value_name("PASSWORD")
                        .takes_value(true),
                ),
        )
        .subcommand(Command::new("logout").about("Ends the session"))
        .subcommand(Command::new("whoami").about("Shows the session user and role"))
        .subcommand(
            Command::new("hash-password")
                .about("Prints a bcrypt hash for the users section of the config")
                .arg(Arg::new("password").value_name("PASSWORD").required(true).index(1))
                .arg(
                    Arg::new("cost")
                        .long("cost")
                        .value_name("COST")
                        .default_value("12")
                        .takes_value(true),
                ),
        )
        .subcommand(
            Command::new("material")
                .about("Project materials")
                .subcommand_required(true)
                .subcommand(
                    Command::new("add")
                        .about("Records a material line")
                        .arg(
                            Arg::new("project")
                                .short('p')
                                .long("project")
                                .value_name("CODE")
                                .takes_value(true)
                                .required(true),
                        )
                        .arg(
                            Arg::new("material")
                                .short('m')
                                .long("material")
                                .help("Material code from the catalog")
                                .value_name("CODE")
                                .takes_value(true)
                                .required(true),
                        )
                        .arg(
                            Arg::new("quantity")
                                .short('q')
                                .long("quantity")
                                .value_name("QUANTITY")
                                .takes_value(true)
                                .required(true),
                        )
                        .arg(
                            Arg::new("unit")
                                .short('u')
                                .long("unit")
                                .help("Defaults to the material's base unit")
                                .value_name("UNIT")
                                .takes_value(true),
                        )
                        .arg(
                            Arg::new("price")
                                .long("price")
                                .help("Price per unit")
                                .value_name("AMOUNT")
                                .default_value("0")
                                .takes_value(true),
                        )
                        .arg(
                            Arg::new("date")
                                .short('d')
                                .long("date")
                                .value_name("DATE")
                                .takes_value(true),
                        )
                        .arg(
                            Arg::new("note")
                                .short('n')
                                .long("note")
                                .value_name("TEXT")
                                .default_value("")
                                .takes_value(true),
                        ),
                )
                .subcommand(
                    Command::new("list").about("Lists material lines").arg(
                        Arg::new("project")
                            .short('p')
                            .long("project")
                            .value_name("CODE")
                            .takes_value(true),
                    ),
                )
                .subcommand(
                    Command::new("delete")
                        .about("Deletes a material line")
                        .arg(id_arg()),
                )
                .subcommand(
                    Command::new("summary")
                        .about("Totals per material for a project")
                        .arg(Arg::new("project").value_name("CODE").required(true).index(1)),
                ),
        )
        .subcommand(
            Command::new("project")
                .about("Projects")
                .subcommand_required(true)
                .subcommand(
                    Command::new("new").about("Prints the next free project code").arg(
                        Arg::new("date")
                            .short('d')
                            .long("date")
                            .value_name("DATE")
                            .takes_value(true),
                    ),
                ),
        )
}

fn date_or_today(matches: &ArgMatches) -> Result<NaiveDate> {
    matches
        .value_of("date")
        .map_or_else(|| Ok(Local::now().date_naive()), parse_date)
}

fn new_transaction(matches: &ArgMatches) -> Result<NewTransaction> {
    let kind: Kind = matches.value_of("kind").unwrap_or_default().parse()?;
    let amount: Money = matches.value_of("amount").unwrap_or_default().parse()?;
    let description = matches.value_of("description").unwrap_or_default();
    Ok(NewTransaction::new(
        date_or_today(matches)?,
        kind,
        amount.round_units(),
        description,
    ))
}

fn id(matches: &ArgMatches) -> Result<usize> {
    let id = matches.value_of("id").unwrap_or_default();
    id.parse().with_context(|| format!("Not a row number: '{}'", id))
}

/// What to print when a report has no transaction rows.
fn empty_notice(transactions: &[Transaction], report: &Report) -> Option<&'static str> {
    if transactions.is_empty() {
        Some("No data yet")
    } else if report.transactions().next().is_none() {
        Some("No transactions in this report")
    } else {
        None
    }
}

async fn read_password() -> Result<String> {
    eprint!("Password: ");
    let mut password = String::new();
    stdin().read_line(&mut password).await?;
    Ok(password.trim_end_matches(['\r', '\n']).to_string())
}

async fn run_materials(
    matches: &ArgMatches,
    config: &Config,
    session: &mut SessionState,
) -> Result<()> {
    let store = FileStore::new(&config.materials, materials::HEADER);
    let mut materials = Materials::new(store, config.catalog.clone());
    match matches.subcommand() {
        Some(("add", add)) => {
            session.require_admin(config)?;
            let code = add.value_of("material").unwrap_or_default();
            let material = materials.catalog().get(code)?;
            let quantity = add.value_of("quantity").unwrap_or_default();
            let line = MaterialLine {
                id: 0,
                project: add.value_of("project").unwrap_or_default().to_string(),
                material: material.code.clone(),
                date: date_or_today(add)?,
                quantity: Decimal::from_str(quantity)
                    .with_context(|| format!("Not a quantity: '{}'", quantity))?,
                unit: add
                    .value_of("unit")
                    .map_or_else(|| material.base_unit.clone(), String::from),
                unit_price: add.value_of("price").unwrap_or_default().parse()?,
                note: add.value_of("note").unwrap_or_default().to_string(),
            };
            let id = materials.record(line).await?;
            println!("Recorded material line {}", id);
        }
        Some(("list", list)) => {
            session.require_reader(config)?;
            let lines = match list.value_of("project") {
                Some(project) => materials.project_lines(project).await?,
                None => materials.lines().await?,
            };
            session.mark_reloaded(Sheet::Materials);
            if lines.is_empty() {
                println!("No material lines yet");
            }
            lines.iter().for_each(|line| println!("{line}"));
        }
        Some(("delete", delete)) => {
            session.require_admin(config)?;
            session.require_fresh_ids(Sheet::Materials)?;
            materials.delete(id(delete)?).await?;
            session.mark_deleted(Sheet::Materials);
            println!("Deleted; run material list before deleting by row number again");
        }
        Some(("summary", summary)) => {
            session.require_reader(config)?;
            let project = summary.value_of("project").unwrap_or_default();
            let lines = materials.project_summary(project).await?;
            if lines.is_empty() {
                println!("No material lines for {}", project);
            }
            let total = lines.iter().fold(Money::default(), |acc, line| acc + line.cost);
            lines.iter().for_each(|line| println!("{line}"));
            println!("{:10} | {:24} | {:>17} | {:>16}", "Total", "", "", total.to_string());
        }
        _ => unreachable!("subcommand required"),
    }
    Ok(())
}

async fn run(matches: &ArgMatches, config: &Config, session: &mut SessionState) -> Result<()> {
    let mut ledger = Ledger::new(FileStore::new(&config.ledger, transaction::raw::HEADER));
    match matches.subcommand() {
        Some(("add", add)) => {
            session.require_admin(config)?;
            let new = new_transaction(add)?;
            let id = match add.value_of("receipt") {
                Some(file) => {
                    let bytes = async_std::fs::read(file)
                        .await
                        .with_context(|| format!("Failed to read receipt {}", file))?;
                    let blobs = thuchi::receipt::DirBlobStore::new(&config.receipts);
                    ledger.add_with_receipt(new, &bytes, &blobs).await?
                }
                None => ledger.add(new).await?,
            };
            println!("Added row {}", id);
        }
        Some(("edit", edit)) => {
            session.require_admin(config)?;
            session.require_fresh_ids(Sheet::Ledger)?;
            ledger.edit(id(edit)?, new_transaction(edit)?).await?;
        }
        Some(("delete", delete)) => {
            session.require_admin(config)?;
            session.require_fresh_ids(Sheet::Ledger)?;
            ledger.delete(id(delete)?).await?;
            session.mark_deleted(Sheet::Ledger);
            println!("Deleted; run list before editing by row number again");
        }
        Some(("list", _)) => {
            session.require_reader(config)?;
            let transactions = ledger.transactions().await?;
            session.mark_reloaded(Sheet::Ledger);
            if transactions.is_empty() {
                println!("No data yet");
            }
            transactions.iter().for_each(|tx| println!("{tx}"));
        }
        Some(("balance", _)) => {
            session.require_reader(config)?;
            println!("{}", Money::from(ledger.balance().await?));
        }
        Some(("settle", settle)) => {
            session.require_reader(config)?;
            if let (Some(from), Some(to)) = (settle.value_of("from"), settle.value_of("to")) {
                session.window = Some(Window::new(parse_date(from)?, parse_date(to)?));
            } else if settle.is_present("since zero") {
                session.window = None;
            }
            let transactions = ledger.load().await?;
            let report = build_settlement_report(&transactions, session.window);
            session.mark_reloaded(Sheet::Ledger);
            verify(&report)?;
            if let Some(notice) = empty_notice(&transactions, &report) {
                println!("{notice}");
            }
            print!("{report}");
            if let Some(file) = settle.value_of("export") {
                export::to_file(&report, Path::new(file))?;
                println!("Exported to {}", file);
            }
        }
        Some(("import", import)) => {
            session.require_admin(config)?;
            let path = import.value_of("path").filter(|path| *path != "-");
            let ids = ledger.import(lines::records(path.map(String::from))).await?;
            println!("Imported {} rows", ids.len());
        }
        Some(("login", login)) => {
            let user = login.value_of("user").unwrap_or_default();
            let password = match login.value_of("password") {
                Some(password) => password.to_string(),
                None => read_password().await?,
            };
            let role = session.log_in(config, user, &password)?;
            println!("Logged in as {} ({})", user, role);
        }
        Some(("logout", _)) => session.log_out(),
        Some(("whoami", _)) => match (&session.user, session.role(config)) {
            (_, Some(role)) if !config.auth_enabled() => {
                println!("No users configured, acting as {}", role)
            }
            (Some(user), Some(role)) => println!("{} ({})", user, role),
            _ => println!("Not logged in"),
        },
        Some(("hash-password", hash)) => {
            let cost = hash.value_of("cost").unwrap_or_default();
            let cost = cost
                .parse()
                .with_context(|| format!("Not a bcrypt cost: '{}'", cost))?;
            println!("{}", hash_password(hash.value_of("password").unwrap_or_default(), cost)?);
        }
        Some(("material", material)) => run_materials(material, config, session).await?,
        Some(("project", project)) => {
            if let Some(new) = project.subcommand_matches("new") {
                session.require_admin(config)?;
                let store = FileStore::new(&config.materials, materials::HEADER);
                let materials = Materials::new(store, config.catalog.clone());
                println!("{}", materials.new_project_code(date_or_today(new)?).await?);
            }
        }
        Some((other, _)) => bail!("Unknown command '{}'", other),
        None => bail!("No command given"),
    }
    Ok(())
}

#[async_std::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    logging::init_tracing(matches.is_present("verbose"));

    let config_file = PathBuf::from(matches.value_of("config").unwrap_or(DEFAULT_CONFIG_FILE));
    let config = Config::from_file(&config_file).await?;
    let mut session = SessionState::load(&config.session).await?;
    let before = session.clone();

    let result = run(&matches, &config, &mut session).await;
    if session != before {
        session.save(&config.session).await?;
    }
    result
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    #[test]
    fn cli_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn settle_window_args() -> Result<()> {
        let matches = cli().try_get_matches_from([
            "thuchi", "settle", "--from", "2024-05-01", "--to", "31/05/2024", "-o", "out.csv",
        ])?;
        let settle = matches.subcommand_matches("settle").context("settle")?;
        assert_eq!(settle.value_of("from"), Some("2024-05-01"));
        assert_eq!(settle.value_of("export"), Some("out.csv"));

        assert!(cli().try_get_matches_from(["thuchi", "settle", "--from", "2024-05-01"]).is_err());
        Ok(())
    }

    #[test]
    fn add_args() -> Result<()> {
        let matches = cli().try_get_matches_from([
            "thuchi", "add", "-k", "chi", "-a", "1.200.000", "-m", "mua thép", "-d", "2024-05-02",
        ])?;
        let add = matches.subcommand_matches("add").context("add")?;
        let new = new_transaction(add)?;
        assert_eq!(new.kind, Kind::Expense);
        assert_eq!(new.amount, 1_200_000);
        assert_eq!(new.date, parse_date("2024-05-02")?);
        Ok(())
    }

    #[test]
    fn empty_window_is_not_an_empty_ledger() -> Result<()> {
        let transactions = vec![Transaction {
            id: 1,
            date: parse_date("2024-05-01")?,
            kind: Kind::Income,
            amount: 500_000,
            description: "Ứng tiền".to_string(),
            receipt_link: String::new(),
        }];
        let june = Window::new(parse_date("2024-06-01")?, parse_date("2024-06-30")?);

        let report = build_settlement_report(&transactions, Some(june));
        assert_eq!(empty_notice(&transactions, &report), Some("No transactions in this report"));

        let report = build_settlement_report(&[], Some(june));
        assert_eq!(empty_notice(&[], &report), Some("No data yet"));

        let report = build_settlement_report(&transactions, None);
        assert_eq!(empty_notice(&transactions, &report), None);
        Ok(())
    }

    #[async_std::test]
    async fn material_delete_needs_fresh_list() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = Config {
            ledger: dir.path().join("thuchi.psv"),
            materials: dir.path().join("materials.psv"),
            ..Config::default()
        };
        std::fs::write(
            &config.materials,
            indoc::indoc! {"
                MaDuAn|MaVatTu|Ngay|SoLuong|DonVi|DonGia|GhiChu
                P|XM|2024-06-01|1|bao|90000|
                P|CAT|2024-06-02|2|m3|300000|
                P|DA|2024-06-03|3|m3|250000|
            "},
        )?;
        let mut session = SessionState::default();
        let delete = cli().try_get_matches_from(["thuchi", "material", "delete", "1"])?;
        let list = cli().try_get_matches_from(["thuchi", "material", "list"])?;

        run(&delete, &config, &mut session).await?;
        assert!(session.materials_need_reload);
        assert!(run(&delete, &config, &mut session).await.is_err());
        assert_eq!(std::fs::read_to_string(&config.materials)?.lines().count(), 3);

        run(&list, &config, &mut session).await?;
        run(&delete, &config, &mut session).await?;
        let left = std::fs::read_to_string(&config.materials)?;
        assert_eq!(left.lines().count(), 2);
        assert!(left.contains("P|DA|2024-06-03"));
        Ok(())
    }
}
