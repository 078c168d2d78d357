use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use diffsummary::config::{SummaryConfig, DEFAULT_CONFIG_FILE};
use diffsummary::dimensions::hierarchy::DEFAULT_HIERARCHIES;
use diffsummary::service::{
    build_auto_ordered_summary, build_manual_ordered_summary, AutoSummaryRequest,
    ManualSummaryRequest, SummaryContext,
};
use diffsummary::summary::SummaryResponse;
use diffsummary::{AggregateGateway, Hierarchy, InMemoryGateway, TimeRange};

#[derive(Parser)]
#[command(name = "diffsummary")]
#[command(about = "Explain metric changes between two time windows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, help = "Config file path")]
    config: Option<String>,

    #[arg(long, help = "Dataset JSON file backing the in-memory gateway")]
    data: Option<String>,

    #[arg(long, help = "Output as JSON")]
    json: bool,
}

#[derive(clap::Args)]
struct Window {
    #[arg(long, help = "Baseline start, epoch millis (inclusive)", allow_negative_numbers = true)]
    baseline_start: i64,
    #[arg(long, help = "Baseline end, epoch millis (exclusive)", allow_negative_numbers = true)]
    baseline_end: i64,
    #[arg(long, help = "Current start, epoch millis (inclusive)", allow_negative_numbers = true)]
    current_start: i64,
    #[arg(long, help = "Current end, epoch millis (exclusive)", allow_negative_numbers = true)]
    current_end: i64,
    #[arg(long, help = "Timezone id passed to the gateway")]
    time_zone: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Summary with the dimension order chosen from the data
    Auto {
        #[arg(long)]
        table: String,
        #[command(flatten)]
        window: Window,
        #[arg(long, help = "Comma-separated candidate dimensions")]
        dimensions: Option<String>,
        #[arg(long, default_value_t = 10, allow_negative_numbers = true)]
        summary_size: i64,
        #[arg(long, allow_negative_numbers = true)]
        top_dimensions: Option<i64>,
        #[arg(long, default_value = DEFAULT_HIERARCHIES, help = "JSON list of dimension chains")]
        hierarchies: String,
        #[arg(long)]
        one_side_error: bool,
    },
    /// Summary drilling down in the given dimension order
    Manual {
        #[arg(long)]
        table: String,
        #[arg(long)]
        metric: String,
        #[command(flatten)]
        window: Window,
        #[arg(long, help = "Comma-separated dimensions in drill-down order")]
        dimensions: Option<String>,
        #[arg(long, default_value_t = 10, allow_negative_numbers = true)]
        summary_size: i64,
        #[arg(long)]
        one_side_error: bool,
    },
    /// List the candidate dimensions of a table
    Columns {
        #[arg(long)]
        table: String,
    },
    GenerateConfig {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE, help = "Config file path")]
        output: String,
    },
}

/// Comma-separated dimension list; blank or `undefined` means "use the table columns".
fn parse_dimensions(raw: Option<String>) -> Option<Vec<String>> {
    let raw = raw?;
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "undefined" {
        return None;
    }
    Some(trimmed.split(',').map(|s| s.trim().to_string()).collect())
}

async fn load_gateway(data: Option<&str>) -> anyhow::Result<Arc<dyn AggregateGateway>> {
    let path = data.ok_or_else(|| anyhow::anyhow!("--data is required for this command"))?;
    let gateway = InMemoryGateway::from_json_file(path).await?;
    info!("Loaded dataset from {}", path);
    Ok(Arc::new(gateway))
}

fn print_response(response: &SummaryResponse, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    println!("📊 Difference Summary");
    println!("=====================");
    if !response.available {
        println!("❌ Summary not available");
        return Ok(());
    }
    if let Some(metric) = &response.metric_name {
        println!("   Metric: {}", metric);
    }
    println!("   Dimensions: {}", response.dimensions.join(", "));
    println!(
        "   Total: {} -> {} ({})",
        response.baseline_total,
        response.current_total,
        format_ratio(response.global_ratio)
    );
    println!();
    for (i, row) in response.response_rows.iter().enumerate() {
        println!(
            "   {}. {}: {} -> {} ({}), {:.1}% of change, cost {:.4}",
            i + 1,
            row.names.join(" / "),
            row.baseline_value,
            row.current_value,
            format_ratio(row.change_ratio),
            row.contribution * 100.0,
            row.cost
        );
    }
    Ok(())
}

fn format_ratio(ratio: Option<f64>) -> String {
    match ratio {
        Some(r) => format!("{:+.1}%", (r - 1.0) * 100.0),
        None => "new".to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("diffsummary=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = SummaryConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Auto {
            table,
            window,
            dimensions,
            summary_size,
            top_dimensions,
            hierarchies,
            one_side_error,
        } => {
            let gateway = load_gateway(cli.data.as_deref()).await?;
            let ctx = SummaryContext::new(gateway, config);
            let outcome = match Hierarchy::from_json(&hierarchies) {
                Ok(hierarchy) => {
                    let request = AutoSummaryRequest {
                        table,
                        baseline: TimeRange::new(window.baseline_start, window.baseline_end),
                        current: TimeRange::new(window.current_start, window.current_end),
                        dimensions: parse_dimensions(dimensions),
                        summary_size,
                        top_dimensions,
                        hierarchy,
                        one_side_error,
                        timezone: window.time_zone,
                    };
                    build_auto_ordered_summary(&ctx, request).await
                }
                Err(e) => Err(e),
            };
            print_response(&SummaryResponse::from_outcome(outcome), cli.json)
        }
        Commands::Manual {
            table,
            metric,
            window,
            dimensions,
            summary_size,
            one_side_error,
        } => {
            let gateway = load_gateway(cli.data.as_deref()).await?;
            let ctx = SummaryContext::new(gateway, config);
            let request = ManualSummaryRequest {
                metric,
                table,
                baseline: TimeRange::new(window.baseline_start, window.baseline_end),
                current: TimeRange::new(window.current_start, window.current_end),
                dimensions: parse_dimensions(dimensions),
                summary_size,
                one_side_error,
                timezone: window.time_zone,
            };
            let outcome = build_manual_ordered_summary(&ctx, request).await;
            print_response(&SummaryResponse::from_outcome(outcome), cli.json)
        }
        Commands::Columns { table } => {
            let gateway = load_gateway(cli.data.as_deref()).await?;
            let ctx = SummaryContext::new(gateway, config);
            match ctx.candidate_dimensions(&table).await {
                Ok(columns) => {
                    if cli.json {
                        println!("{}", serde_json::json!({"table": table, "dimensions": columns}));
                    } else {
                        println!("📋 Dimensions of {}", table);
                        println!("==================");
                        for column in columns {
                            println!("   {}", column);
                        }
                    }
                    Ok(())
                }
                Err(e) => {
                    if cli.json {
                        println!("{}", serde_json::json!({"error": e.to_string()}));
                    } else {
                        eprintln!("❌ Failed to list dimensions: {}", e);
                    }
                    Err(e.into())
                }
            }
        }
        Commands::GenerateConfig { output } => {
            let config = SummaryConfig::default();
            match config.save(&output) {
                Ok(_) => {
                    if cli.json {
                        println!("{}", serde_json::json!({
                            "success": true,
                            "config_file": output,
                        }));
                    } else {
                        println!("⚙️  Generate Configuration");
                        println!("========================");
                        println!("✅ Default configuration saved to: {}", output);
                    }
                    Ok(())
                }
                Err(e) => {
                    if cli.json {
                        println!("{}", serde_json::json!({"error": e.to_string()}));
                    } else {
                        eprintln!("❌ Failed to create config file: {}", e);
                    }
                    Err(e)
                }
            }
        }
    }
}
