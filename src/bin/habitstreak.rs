use clap::{Parser, Subcommand};

use habitstreak::calendar::month_view;
use habitstreak::date_util::{format_date, parse_date};
use habitstreak::metrics::{compute_dashboard, compute_habit_stats};
use habitstreak::{
    Category, Database, Habit, HabitFilter, HabitId, HabitPatch, HabitStore, HabitTracker, Month,
    NewHabit, ToggleState,
};

#[derive(Parser)]
#[command(name = "habitstreak", about = "Track daily habits and streaks")]
struct Cli {
    /// Database path (default: ~/.habitstreak/habitstreak.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and a local user id
    Init,
    /// List habits
    List {
        /// all, active (done today) or inactive
        #[arg(long, default_value = "all")]
        filter: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a habit
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// fitness, health, productivity, finance, personal, learning, mindfulness or social
        #[arg(long)]
        category: Option<String>,
    },
    /// Change a habit's name, description or category
    Edit {
        /// Habit id (or a unique prefix of it)
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,
        /// fitness, health, productivity, finance, personal, learning, mindfulness or social
        #[arg(long, conflicts_with = "clear_category")]
        category: Option<String>,
        #[arg(long)]
        clear_description: bool,
        #[arg(long)]
        clear_category: bool,
    },
    /// Delete a habit and all of its completions
    Remove {
        /// Habit id (or a unique prefix of it)
        id: String,
    },
    /// Mark a habit done (or undone) for a day
    Toggle {
        /// Habit id (or a unique prefix of it)
        id: String,
        /// Day to toggle (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Show a habit with its calendar for one month
    Show {
        /// Habit id (or a unique prefix of it)
        id: String,
        /// YYYY-MM, current or previous
        #[arg(long, default_value = "current")]
        month: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Dashboard summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => Database::open_at(path).await?,
        None => Database::open().await?,
    };
    let tracker = HabitTracker::new(db);

    match cli.command {
        Commands::Init => {
            let user = tracker.ensure_user_id().await?;
            println!("Ready. User id: {user}");
        }
        Commands::Config { action } => {
            handle_config(&tracker, action).await?;
        }
        Commands::List { filter, json } => {
            let filter: HabitFilter = filter.parse()?;
            let store = open_store(&tracker).await?;
            let habits = store.habits();
            let today = store.today();
            let selected = filter.apply(&habits, today);
            if json {
                println!("{}", serde_json::to_string_pretty(&selected)?);
            } else if selected.is_empty() {
                println!("No habits ({filter}).");
            } else {
                for h in selected {
                    print_habit_line(h, today);
                }
            }
        }
        Commands::Add {
            name,
            description,
            category,
        } => {
            let mut new = NewHabit::new(name);
            if let Some(d) = description {
                new = new.description(d);
            }
            if let Some(c) = category {
                new = new.category(c.parse::<Category>()?);
            }
            let store = open_store(&tracker).await?;
            let habit = store.create(new).await?;
            println!("Created {} ({})", habit.name, habit.id);
        }
        Commands::Edit {
            id,
            name,
            description,
            category,
            clear_description,
            clear_category,
        } => {
            let patch = HabitPatch {
                name,
                description: if clear_description {
                    Some(None)
                } else {
                    description.map(Some)
                },
                category: if clear_category {
                    Some(None)
                } else {
                    category
                        .map(|c| c.parse::<Category>())
                        .transpose()?
                        .map(Some)
                },
            };
            if patch.is_empty() {
                anyhow::bail!("Nothing to change. Pass --name, --description or --category.");
            }
            let store = open_store(&tracker).await?;
            let habit_id = resolve_habit(&store, &id)?;
            let habit = store.update(&habit_id, patch).await?;
            println!("Updated {} ({})", habit.name, habit.id);
        }
        Commands::Remove { id } => {
            let store = open_store(&tracker).await?;
            let habit_id = resolve_habit(&store, &id)?;
            store.remove(&habit_id).await?;
            println!("Removed {habit_id}");
        }
        Commands::Toggle { id, date } => {
            let store = open_store(&tracker).await?;
            let habit_id = resolve_habit(&store, &id)?;
            let date = match date {
                Some(d) => parse_date(&d)?,
                None => store.today(),
            };
            let outcome = store.toggle(&habit_id, date).await?;
            let verb = if outcome.completed { "Done" } else { "Undone" };
            match outcome.state {
                ToggleState::Committed => println!(
                    "{verb} for {}. Streak: {}",
                    format_date(outcome.date),
                    outcome.streak_count
                ),
                other => println!("Toggle ended in state {other:?}"),
            }
        }
        Commands::Show { id, month, json } => {
            let store = open_store(&tracker).await?;
            let habit_id = resolve_habit(&store, &id)?;
            let habit = store
                .get_by_id(&habit_id)
                .ok_or_else(|| anyhow::anyhow!("Habit {habit_id} not found"))?;
            let today = store.today();
            let month = Month::parse(&month, today)?;
            let stats = compute_habit_stats(&habit, today);
            let days = month_view(&habit, month, today);

            if json {
                let out = serde_json::json!({
                    "stats": stats,
                    "month": month.to_string(),
                    "days": days,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{} ({})", habit.name, habit.id);
                if let Some(d) = &habit.description {
                    println!("  {d}");
                }
                if let Some(c) = habit.category {
                    println!("  Category:    {c}");
                }
                println!("  Streak:      {}", stats.streak_count);
                println!("  Completions: {}", stats.total_completions);
                println!(
                    "  Today:       {}",
                    if stats.completed_today { "done" } else { "not yet" }
                );
                println!();
                print_calendar(month, &days);
            }
        }
        Commands::Status { json } => {
            let store = open_store(&tracker).await?;
            let habits = store.habits();
            let m = compute_dashboard(&habits, store.tier(), store.today());
            if json {
                println!("{}", serde_json::to_string_pretty(&m)?);
            } else {
                println!("Habit Status ({} plan)", store.tier());
                println!("  Habits:          {}", m.total_habits);
                println!("  Done today:      {}/{}", m.completed_today, m.total_habits);
                println!("  Highest streak:  {}", m.highest_streak);
                println!("  Completions:     {}", m.total_completions);
                match m.remaining_slots {
                    Some(n) => println!("  Slots left:      {n}"),
                    None => println!("  Slots left:      unlimited"),
                }
            }
        }
    }

    Ok(())
}

/// Build a store for the configured user and load it.
async fn open_store(tracker: &HabitTracker) -> anyhow::Result<HabitStore> {
    if tracker.config_get(habitstreak::CONFIG_USER_ID).await?.is_none() {
        anyhow::bail!("No user configured. Run 'habitstreak init' first.");
    }
    let store = tracker.store().await?;
    store.load().await?;
    Ok(store)
}

/// Resolve a full habit id or a unique prefix of one.
fn resolve_habit(store: &HabitStore, identifier: &str) -> anyhow::Result<HabitId> {
    let exact = HabitId::new(identifier);
    if store.get_by_id(&exact).is_some() {
        return Ok(exact);
    }
    let matches: Vec<HabitId> = store
        .habits()
        .into_iter()
        .filter(|h| h.id.as_str().starts_with(identifier))
        .map(|h| h.id)
        .collect();
    match matches.as_slice() {
        [one] => Ok(one.clone()),
        [] => anyhow::bail!("No habit matches '{identifier}'"),
        _ => anyhow::bail!("'{identifier}' matches {} habits, be more specific", matches.len()),
    }
}

async fn handle_config(tracker: &HabitTracker, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match tracker.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            tracker.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let entries = tracker.config_list().await?;
            if entries.is_empty() {
                println!("No config values set.");
            }
            for (k, v) in entries {
                println!("{k} = {v}");
            }
        }
    }
    Ok(())
}

fn print_habit_line(h: &Habit, today: chrono::NaiveDate) {
    let mark = if h.is_completed_on(today) { "x" } else { " " };
    let id: String = h.id.as_str().chars().take(8).collect();
    let category = h.category.map(|c| c.to_string()).unwrap_or_default();
    println!(
        "[{mark}] {id}  {:<30} {:<12} streak {}",
        h.name, category, h.streak_count
    );
}

fn print_calendar(month: Month, days: &[habitstreak::CalendarDay]) {
    use chrono::Datelike;

    println!("  {month}");
    println!("  Mo Tu We Th Fr Sa Su");
    let Some(first) = days.first() else {
        return;
    };
    let mut line = String::from("  ");
    line.push_str(&"   ".repeat(first.date.weekday().num_days_from_monday() as usize));
    for day in days {
        line.push_str(&format!(" {} ", day.status.symbol()));
        if day.date.weekday() == chrono::Weekday::Sun {
            println!("{}", line.trim_end());
            line = String::from("  ");
        }
    }
    if !line.trim().is_empty() {
        println!("{}", line.trim_end());
    }
    println!("  (# streak, o done, . missed, ? today)");
}
