// Entry point and interactive dashboard menu.
//
// - Option [1] loads and cleans the CSV and installs it as the session data.
// - Options [2]-[5] print one dashboard tab over the current filtered view.
// - Options [6]/[7] change the filter; every tab reflects it afterwards.
// - Option [8] prints the data summary and exports it with the cleaned set.
use clap::{Parser, Subcommand};
use healthcare_dashboard::config::{DashboardConfig, DEFAULT_DATA_FILE};
use healthcare_dashboard::error::{DashboardError, Result};
use healthcare_dashboard::filter::{self, FilterCriteria};
use healthcare_dashboard::types::{BillType, CleanedRecord, SummaryReport};
use healthcare_dashboard::{geocode, loader, output, reports, util, LoadReport};
use once_cell::sync::Lazy;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "healthcare_dashboard", version, about = "Healthcare admissions dashboard")]
struct Cli {
    /// CSV file to load with option [1]
    #[arg(long, default_value = DEFAULT_DATA_FILE)]
    data: PathBuf,

    /// Rows shown per table preview
    #[arg(long, default_value_t = 10)]
    preview_rows: usize,

    /// Add a "< 0" bin for refunds to the cost distribution
    #[arg(long)]
    include_refund_bin: bool,

    /// Add a ">= 100,000" bin to the cost distribution
    #[arg(long)]
    include_overflow_bin: bool,

    /// Directory for exported files
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add synthetic city/country/coordinates per hospital to a CSV
    Enrich {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
}

impl Cli {
    fn config(&self) -> DashboardConfig {
        DashboardConfig::default()
            .with_data_path(&self.data)
            .with_preview_rows(self.preview_rows)
            .with_refund_bin(self.include_refund_bin)
            .with_overflow_bin(self.include_overflow_bin)
            .with_out_dir(&self.out_dir)
    }
}

// Load diagnostics kept next to the filter session so option [8] can show
// them without reloading.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| {
    Mutex::new(AppState {
        summary: None,
        load: None,
    })
});

struct AppState {
    summary: Option<SummaryReport>,
    load: Option<LoadReport>,
}

fn init_logging(level: &str, quiet: bool) {
    let level = if quiet { "warn" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn prompt(label: &str) -> String {
    print!("{}", label);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

fn read_choice() -> String {
    prompt("Enter choice: ")
}

fn optional_text(label: &str) -> Option<String> {
    let value = prompt(label);
    (!value.is_empty()).then_some(value)
}

fn optional_parsed<T: std::str::FromStr>(label: &str, field: &str) -> Result<Option<T>> {
    match optional_text(label) {
        None => Ok(None),
        Some(v) => v.parse().map(Some).map_err(|_| DashboardError::InvalidFilter {
            field: field.to_string(),
            value: v,
        }),
    }
}

/// Option [1]: load and clean the CSV file into the filter session.
fn handle_load(config: &DashboardConfig) {
    match loader::load_and_clean(&config.data_path) {
        Ok((processed, report)) => {
            println!(
                "Processing dataset... ({} rows read, {} cleaned records)",
                util::format_int(report.total_rows),
                util::format_int(report.cleaned_rows)
            );
            println!(
                "Note: {} rows skipped due to read errors, {} duplicates removed.",
                util::format_int(report.parse_errors),
                util::format_int(report.duplicates_removed)
            );
            println!();

            filter::init(
                processed.cleaned,
                Some(|data: &[CleanedRecord]| {
                    println!("Filter applied: {} records in view.", util::format_int(data.len()));
                }),
            );
            info!("Session ready from {}", config.data_path.display());
            let mut state = APP_STATE.lock().unwrap_or_else(PoisonError::into_inner);
            state.summary = Some(processed.summary);
            state.load = Some(report);
        }
        Err(e) => {
            error!("Failed to load {}: {}", config.data_path.display(), e);
            eprintln!("Failed to load file: {}\n", e);
        }
    }
}

fn handle_overview(config: &DashboardConfig) -> Result<()> {
    let report = filter::with_session(|m| reports::overview(m))?;
    let k = &report.kpis;
    println!("Overview");
    println!(
        "Total patients: {} | Total billing: {} | Avg age: {} | Avg stay: {} days",
        util::format_int(k.total_patients),
        util::format_currency(k.total_billing),
        util::format_opt(k.avg_age, 1),
        util::format_opt(k.avg_length_of_stay, 1)
    );
    let n = config.preview_rows;
    output::preview_table("Test Results", None, &report.test_results, n);
    output::preview_cross_tab("Medical Condition by Test Results", &report.condition_by_test_result, n);
    output::preview_cross_tab("Medical Condition by Age Group", &report.condition_by_age_group, n);
    output::preview_table("Medical Conditions", None, &report.conditions, n);
    output::preview_table("Admission Types", None, &report.admission_types, n);
    output::preview_table("Average Length of Stay", Some("days"), &report.stay_by_condition, n);
    output::preview_table(
        "Length of Stay by Condition and Admission Type",
        Some("days"),
        &report.stay_by_condition_and_admission,
        n,
    );
    Ok(())
}

fn handle_demographics(config: &DashboardConfig) -> Result<()> {
    let report = filter::with_session(|m| reports::demographics(m))?;
    println!("Demographics");
    println!(
        "Total patients: {} | Avg age: {}",
        util::format_int(report.total_patients),
        util::format_opt(report.avg_age, 1)
    );
    if let Some(split) = report.gender_split {
        println!("Male {}% / Female {}%", split.male_pct, split.female_pct);
    }
    let n = config.preview_rows;
    output::preview_table("Gender", None, &report.genders, n);
    output::preview_table("Age Groups", None, &report.age_groups, n);
    output::preview_table("Blood Types", Some("positive vs negative"), &report.blood_types, n);
    output::preview_cross_tab("Admission Type by Age Group", &report.admission_by_age_group, n);
    Ok(())
}

fn handle_financial(config: &DashboardConfig) -> Result<()> {
    let report = filter::with_session(|m| reports::financial(m, &config.bins))?;
    let k = &report.kpis;
    println!("Financial");
    println!(
        "Revenue: {} | Refunds: {} | Records: {} | Patients: {} | Avg bill: {} | Avg stay: {}",
        util::format_currency(k.total_revenue),
        util::format_currency(k.total_refunds),
        util::format_int(k.total_records),
        util::format_int(k.unique_patients),
        util::format_opt(k.avg_billing, 2),
        util::format_opt(k.avg_length_of_stay, 1)
    );
    let n = config.preview_rows;
    output::preview_table("Cost Distribution", None, &report.cost_distribution, n);
    output::preview_table("Insurance Providers", Some("by total billed"), &report.insurance, n);
    output::preview_table("Monthly Billing", None, &report.monthly, n);
    println!("\nAnnual Billing Trend\n");
    if report.annual.is_empty() {
        println!("(no rows)\n");
    } else {
        println!("{}\n", output::render_year_trends(&report.annual));
    }
    output::preview_table("Billing by Country and Year", None, &report.by_country_year, n);

    let path = config.out_path("financial_report.json");
    output::write_json(&path, &report)?;
    let insurance_path = config.out_path("insurance_providers.csv");
    output::write_csv(&insurance_path, &report.insurance)?;
    println!(
        "(Full report exported to {}, insurance table to {})\n",
        path.display(),
        insurance_path.display()
    );
    Ok(())
}

fn handle_geographic(config: &DashboardConfig) -> Result<()> {
    let report = filter::with_session(|m| reports::geographic(m))?;
    println!("Geographic");
    let n = config.preview_rows;
    output::preview_table("Hospitals", Some("by patient count"), &report.hospitals, n);
    output::preview_table("Patients by Country", None, &report.countries, n);
    Ok(())
}

fn read_criteria() -> Result<FilterCriteria> {
    let options = filter::with_session(|m| m.options())?;
    println!("Leave a field blank to skip it.");
    println!("Years: {:?}", options.years);
    println!("Countries: {}", options.countries.join(", "));

    let year = optional_parsed::<i32>("Year: ", "year")?;
    let month = optional_parsed::<u32>("Month (1-12): ", "month")?;
    if let Some(m) = month.filter(|m| !(1..=12).contains(m)) {
        return Err(DashboardError::InvalidFilter {
            field: "month".to_string(),
            value: m.to_string(),
        });
    }
    let country = optional_text("Country: ");
    let city = optional_text("City: ");
    let hospital = optional_text("Hospital: ");
    let insurance_provider = optional_text("Insurance provider: ");
    let bill_type = match optional_text("Bill type (Normal/Refund): ") {
        None => None,
        Some(v) => Some(BillType::parse(&v).ok_or(DashboardError::InvalidFilter {
            field: "bill_type".to_string(),
            value: v,
        })?),
    };

    Ok(FilterCriteria {
        year,
        month,
        country,
        city,
        hospital,
        insurance_provider,
        bill_type,
    })
}

fn handle_apply_filter() -> Result<()> {
    let criteria = read_criteria()?;
    let stats = filter::set_filter(criteria)?;
    println!(
        "Showing {} of {} records ({} active filters)\n",
        util::format_int(stats.filtered),
        util::format_int(stats.total),
        stats.active_filter_count
    );
    Ok(())
}

fn handle_reset_filter() -> Result<()> {
    let stats = filter::clear_filter()?;
    println!("Filters cleared: {} records\n", util::format_int(stats.total));
    Ok(())
}

/// Option [8]: print the data summary and export it with the filtered set.
fn handle_summary(config: &DashboardConfig) -> Result<()> {
    let data = filter::get_filtered_data()?;
    let (summary, load) = {
        let state = APP_STATE.lock().unwrap_or_else(PoisonError::into_inner);
        (state.summary.clone(), state.load.clone())
    };
    let summary = summary.ok_or(DashboardError::NoDataLoaded)?;

    if let Some(load) = load {
        println!(
            "Rows read: {} | Cleaned: {} | Duplicates removed: {}",
            util::format_int(load.total_rows),
            util::format_int(load.cleaned_rows),
            util::format_int(load.duplicates_removed)
        );
    }
    let types = healthcare_dashboard::preprocess::column_types(&data);
    println!("\nColumn types:");
    for (col, kind) in &types {
        println!("  {}: {}", col, kind);
    }
    println!("\nMissing values:");
    for (col, n) in summary.missing_values.iter().filter(|(_, n)| **n > 0) {
        println!("  {}: {}", col, util::format_int(*n));
    }
    println!("\nNumeric columns:");
    for (col, s) in &summary.numeric_stats {
        println!(
            "  {}: mean {} | median {} | min {} | max {} | std {}",
            col,
            util::format_number(s.mean, 2),
            util::format_number(s.median, 2),
            util::format_number(s.min, 2),
            util::format_number(s.max, 2),
            util::format_number(s.std, 2)
        );
    }

    let summary_path = config.out_path("summary.json");
    output::write_json(&summary_path, &summary)?;
    let cleaned_path = config.out_path("cleaned_records.csv");
    output::write_records(&cleaned_path, &data)?;
    println!(
        "\nSummary exported to {}; {} records exported to {}\n",
        summary_path.display(),
        util::format_int(data.len()),
        cleaned_path.display()
    );
    Ok(())
}

fn report_error(result: Result<()>) {
    if let Err(e) = result {
        match e {
            DashboardError::NoDataLoaded => {
                println!("Error: No data loaded. Please load the CSV file first (option 1).\n")
            }
            e if e.is_recoverable() => println!("Error: {}\n", e),
            e => {
                error!("{} ({})", e, e.error_code());
                eprintln!("Error: {}\n", e);
            }
        }
    }
}

fn run_menu(config: &DashboardConfig) {
    loop {
        println!("Healthcare Dashboard");
        println!("[1] Load the file");
        println!("[2] Overview");
        println!("[3] Demographics");
        println!("[4] Financial");
        println!("[5] Geographic");
        println!("[6] Apply filter");
        println!("[7] Reset filters");
        println!("[8] Data summary and export");
        println!("[0] Exit\n");
        match read_choice().as_str() {
            "1" => handle_load(config),
            "2" => report_error(handle_overview(config)),
            "3" => report_error(handle_demographics(config)),
            "4" => report_error(handle_financial(config)),
            "5" => report_error(handle_geographic(config)),
            "6" => report_error(handle_apply_filter()),
            "7" => report_error(handle_reset_filter()),
            "8" => report_error(handle_summary(config)),
            "0" => {
                println!("Exiting the program.");
                break;
            }
            _ => println!("Invalid choice. Please enter a number from 0 to 8.\n"),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.quiet);

    match &cli.command {
        Some(Command::Enrich { input, output }) => {
            match geocode::enrich_csv(input, output) {
                Ok(report) => println!(
                    "Enriched {} rows across {} hospitals into {}",
                    util::format_int(report.rows),
                    util::format_int(report.hospitals),
                    output.display()
                ),
                Err(e) => {
                    error!("Enrichment failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => run_menu(&cli.config()),
    }
}
