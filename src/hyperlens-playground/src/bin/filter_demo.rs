//! Filter Demo - associative filtering from the command line
//!
//! Runs counts, value listings and filter passes over the suppliers and
//! parts model. Filters given with `--where` are applied before the
//! subcommand runs.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package hyperlens-playground --bin filter-demo -- --help
//! cargo run --package hyperlens-playground --bin filter-demo -- --where country=Brazil items color
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use common_config::{LensConfig, StoreBackend};
use common_error::{LensError, LensResult};
use hyperlens_core::{EntityKey, InMemoryMetadata, Value};
use hyperlens_engine::{FilterEngine, FilterMode, ItemsRequest};
use hyperlens_store::open_store;

use hyperlens_playground::{
    DEMO_MODEL, create_supply_model, demo_catalog, format_counts, format_report, print_divider,
    print_header, print_results,
};

/// Filter Demo CLI.
#[derive(Parser, Debug)]
#[command(name = "filter-demo")]
#[command(about = "Associative filtering over the suppliers and parts model")]
#[command(version)]
struct Args {
    /// JSON configuration file; the memory backend loads the demo rows
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Filter applied before the command, as `attribute=value[,value...]`
    #[arg(short = 'w', long = "where", value_name = "ATTR=VALUES")]
    filters: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Distinct value counts of every entity
    Counts,

    /// Ranked values of one attribute
    Items {
        /// Attribute alias
        attribute: String,

        /// Owning entity, for junction attributes
        #[arg(short, long)]
        owner: Option<String>,

        /// Order list such as "$c DESC, $v"
        #[arg(long)]
        order: Option<String>,

        /// Maximum rows
        #[arg(short = 'n', long)]
        limit: Option<u64>,

        /// Only values outside the current filter
        #[arg(long, conflicts_with = "included")]
        excluded: bool,

        /// Only values inside the current filter
        #[arg(long)]
        included: bool,
    },

    /// Filter by values of one attribute and propagate
    Filter {
        /// Attribute alias
        attribute: String,

        /// Owning entity, for junction attributes
        #[arg(short, long)]
        owner: Option<String>,

        /// Values to keep
        #[arg(short, long, num_args = 1.., conflicts_with = "condition")]
        values: Vec<String>,

        /// Condition such as "$v >= 10"
        #[arg(long)]
        condition: Option<String>,
    },

    /// Propagation tree from one entity
    Graph {
        /// Entity alias
        #[arg(default_value = "supplier")]
        from: String,
    },

    /// Run a scripted tour of the engine
    Demo,
}

#[tokio::main]
async fn main() -> LensResult<()> {
    let args = Args::parse();
    let mut engine = open_engine(args.config.as_deref()).await?;

    for filter in &args.filters {
        let (attribute, values) = filter.split_once('=').ok_or_else(|| {
            LensError::invalid_parameter(format!("filter `{filter}` is not ATTR=VALUES"))
        })?;
        let values: Vec<String> = values.split(',').map(|v| v.trim().to_string()).collect();
        run_filter(&mut engine, attribute, None, &values, None).await?;
    }

    match args.command {
        Commands::Counts => show_counts(&mut engine).await?,
        Commands::Items {
            attribute,
            owner,
            order,
            limit,
            excluded,
            included,
        } => {
            let owner = match owner {
                Some(alias) => Some(engine.find_entity_set(&alias)?.key()),
                None => None,
            };
            let request = ItemsRequest {
                owner,
                projection: None,
                order,
                limit: limit.map(|n| (n, 0)),
                excluded: (excluded || included).then_some(excluded),
            };
            show_items(&engine, &attribute, request).await?;
        }
        Commands::Filter {
            attribute,
            owner,
            values,
            condition,
        } => {
            let owner = match owner {
                Some(alias) => Some(engine.find_entity_set(&alias)?.key()),
                None => None,
            };
            run_filter(&mut engine, &attribute, owner, &values, condition).await?;
            show_counts(&mut engine).await?;
        }
        Commands::Graph { from } => {
            print_header(&format!("Propagation from {from}"));
            print!("{}", engine.explain_graph(&from)?);
        }
        Commands::Demo => run_demo(&mut engine).await?,
    }

    Ok(())
}

async fn open_engine(path: Option<&Path>) -> LensResult<FilterEngine> {
    let config = match path {
        Some(path) => LensConfig::from_json_file(path)?,
        None => LensConfig::default(),
    };
    match config.store.backend {
        StoreBackend::Memory => {
            let demo = create_supply_model().await?;
            FilterEngine::new(DEMO_MODEL, demo.metadata, demo.store, config.engine).await
        }
        StoreBackend::ClickHouse => {
            let metadata = Arc::new(InMemoryMetadata::new(demo_catalog()?));
            let store = open_store(&config.store)?;
            FilterEngine::new(DEMO_MODEL, metadata, store, config.engine).await
        }
    }
}

async fn run_filter(
    engine: &mut FilterEngine,
    attribute: &str,
    owner: Option<EntityKey>,
    values: &[String],
    condition: Option<String>,
) -> LensResult<()> {
    let hacol = engine.collection(attribute, owner).await?;
    let select = hacol.query().select();
    let builder = match condition {
        Some(cond) => {
            print_header(&format!("Filtering {attribute} where {cond}"));
            select.where_(&cond)?
        }
        None => {
            if values.is_empty() {
                return Err(LensError::invalid_parameter(
                    "give --values or --condition to filter",
                ));
            }
            print_header(&format!("Filtering {attribute} in ({})", values.join(", ")));
            let value_type = hacol.attribute().value_type;
            let parsed = values
                .iter()
                .map(|v| value_type.parse_value(v))
                .collect::<LensResult<Vec<Value>>>()?;
            select.where_("$v")?.in_(parsed)?
        }
    };
    for report in engine.filter(&builder).await? {
        print!("{}", format_report(&report));
    }
    Ok(())
}

async fn show_counts(engine: &mut FilterEngine) -> LensResult<()> {
    print_header("Distinct values per entity");
    let counts = engine.count_items().await?;
    print!("{}", format_counts(&counts));
    Ok(())
}

async fn show_items(engine: &FilterEngine, attribute: &str, request: ItemsRequest) -> LensResult<()> {
    print_header(&format!("Values of {attribute}"));
    let items = engine.get_items(attribute, request).await?;
    print_results(&items);
    Ok(())
}

async fn run_demo(engine: &mut FilterEngine) -> LensResult<()> {
    print_header("Running Demo");

    println!("\n1. Propagation tree from supplier:");
    print!("{}", engine.explain_graph("supplier")?);
    print_divider();

    println!("\n2. Countries before filtering:");
    show_items(engine, "country", ItemsRequest::default()).await?;

    println!("\n3. Filter suppliers from Brazil and Canada:");
    run_filter(
        engine,
        "country",
        None,
        &["Brazil".to_string(), "Canada".to_string()],
        None,
    )
    .await?;

    println!("\n4. Colors of the parts they supply:");
    show_items(engine, "color", ItemsRequest::default()).await?;

    println!("\n5. Narrow to red parts:");
    run_filter(engine, "color", None, &[], Some("$v = 'Red'".to_string())).await?;
    show_counts(engine).await?;

    println!("\n6. Filter the two suppliers at once, as one union:");
    engine.restart().await?;
    let country = engine.collection("country", None).await?;
    let base = country.query().select().where_("$v")?;
    let selections = vec![
        base.in_(vec![Value::from("Mexico")])?.descriptor()?,
        base.in_(vec![Value::from("Argentina")])?.descriptor()?,
    ];
    for report in engine
        .filter_selections(selections, FilterMode::Multiple)
        .await?
    {
        print!("{}", format_report(&report));
    }

    engine.restart().await?;
    println!("\nDemo complete!");
    Ok(())
}
