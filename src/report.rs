use std::fmt::Write;
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use rand::Rng;
use tracing::info;

use crate::aggregate;
use crate::cache::{CacheKey, RefreshCache};
use crate::catalog::DatasetKind;
use crate::config::DashboardConfig;
use crate::error::Result;
use crate::generator::Generator;
use crate::models::{Table, Value};

#[derive(Debug, Clone)]
pub struct Dashboard {
    pub generated_at: NaiveDateTime,
    pub overview: Arc<Table>,
    pub traffic: Arc<Table>,
    pub countries: Arc<Table>,
    pub provinces: Arc<Table>,
    pub products: Arc<Table>,
    pub marketing: Arc<Table>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Kpis {
    pub total_sales: f64,
    pub avg_customers: Option<f64>,
    pub total_revenue: f64,
    pub avg_conversion: Option<f64>,
    pub sales_progress: f64,
    pub revenue_progress: f64,
}

fn cached<R: Rng>(
    cache: &RefreshCache,
    generator: &mut Generator<R>,
    kind: DatasetKind,
    days: i64,
) -> Result<Arc<Table>> {
    cache.get_or_generate(CacheKey::new(kind, days), || generator.dataset(kind, days))
}

/// Load (or reuse, within the current refresh cycle) every dashboard table.
pub fn load_dashboard<R: Rng>(
    cache: &RefreshCache,
    generator: &mut Generator<R>,
    config: &DashboardConfig,
) -> Result<Dashboard> {
    config.validate()?;
    let dashboard = Dashboard {
        generated_at: generator.now(),
        overview: cached(cache, generator, DatasetKind::Overview, config.days)?,
        traffic: cached(cache, generator, DatasetKind::Traffic, config.traffic_days)?,
        countries: cached(cache, generator, DatasetKind::Countries, config.days)?,
        provinces: cached(cache, generator, DatasetKind::Provinces, config.days)?,
        products: cached(cache, generator, DatasetKind::Products, config.days)?,
        marketing: cached(cache, generator, DatasetKind::Marketing, config.days)?,
    };
    info!(cycle = cache.cycle(), "dashboard tables ready");
    Ok(dashboard)
}

pub fn kpis(overview: &Table, config: &DashboardConfig) -> Result<Kpis> {
    let total_sales = aggregate::column_sum(overview, "sales")?;
    let total_revenue = aggregate::column_sum(overview, "revenue")?;
    Ok(Kpis {
        total_sales,
        avg_customers: aggregate::column_mean(overview, "customers")?,
        total_revenue,
        avg_conversion: aggregate::column_mean(overview, "conversions")?,
        sales_progress: aggregate::goal_progress(total_sales, config.sales_goal),
        revenue_progress: aggregate::goal_progress(total_revenue, config.revenue_goal),
    })
}

fn opt(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.decimals$}"))
}

fn text(table: &Table, row: usize, field: &str) -> String {
    table
        .value(row, field)
        .map(Value::to_string)
        .unwrap_or_default()
}

fn number(table: &Table, row: usize, field: &str) -> f64 {
    table
        .value(row, field)
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

pub fn build_report(dashboard: &Dashboard, config: &DashboardConfig) -> Result<String> {
    let mut output = String::new();

    let _ = writeln!(output, "# Dashboard Report");
    let _ = writeln!(
        output,
        "Generated {} over the last {} days (synthetic data)",
        dashboard.generated_at.format("%Y-%m-%d %H:%M"),
        config.days
    );

    write_overview(&mut output, &dashboard.overview, config)?;
    write_traffic(&mut output, &dashboard.traffic, dashboard.generated_at, config)?;
    write_geography(&mut output, &dashboard.countries, &dashboard.provinces, config)?;
    write_products(&mut output, &dashboard.products, config)?;
    write_marketing(&mut output, &dashboard.marketing)?;

    Ok(output)
}

fn write_overview(output: &mut String, overview: &Table, config: &DashboardConfig) -> Result<()> {
    let kpis = kpis(overview, config)?;

    let _ = writeln!(output);
    let _ = writeln!(output, "## Key Metrics");
    let _ = writeln!(output, "- Total sales: {:.0}", kpis.total_sales);
    let _ = writeln!(output, "- Average customers: {}", opt(kpis.avg_customers, 0));
    let _ = writeln!(output, "- Total revenue: ${:.2}", kpis.total_revenue);
    let _ = writeln!(output, "- Average conversion: {}%", opt(kpis.avg_conversion, 1));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Goals");
    let _ = writeln!(
        output,
        "- Sales: {:.0} / {:.0} ({:.1}%)",
        kpis.total_sales,
        config.sales_goal,
        kpis.sales_progress * 100.0
    );
    let _ = writeln!(
        output,
        "- Revenue: ${:.0} / ${:.0} ({:.1}%)",
        kpis.total_revenue,
        config.revenue_goal,
        kpis.revenue_progress * 100.0
    );

    let trend = aggregate::rolling_mean(overview, "revenue", config.rolling_window)?;
    let start = overview.len().saturating_sub(config.recent_days);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Revenue Trend");
    let _ = writeln!(
        output,
        "| date | sales | customers | revenue | {}-day mean |",
        config.rolling_window
    );
    let _ = writeln!(output, "|---|---|---|---|---|");
    for (row, mean) in trend.iter().enumerate().skip(start) {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {:.2} | {} |",
            text(overview, row, "date"),
            text(overview, row, "sales"),
            text(overview, row, "customers"),
            number(overview, row, "revenue"),
            opt(*mean, 2)
        );
    }

    Ok(())
}

fn write_traffic(
    output: &mut String,
    traffic: &Table,
    now: NaiveDateTime,
    config: &DashboardConfig,
) -> Result<()> {
    let cutoff = now - Duration::days(config.period_days);
    let period = aggregate::filter_since(traffic, "datetime", cutoff)?;

    let _ = writeln!(output);
    let _ = writeln!(output, "## Traffic (last {} days)", config.period_days);
    let _ = writeln!(
        output,
        "- Total traffic: {:.0}",
        aggregate::column_sum(&period, "traffic")?
    );
    let _ = writeln!(
        output,
        "- Bounce rate: {}%",
        opt(
            aggregate::column_mean(&period, "bounce_rate")?.map(|v| v * 100.0),
            1
        )
    );
    let _ = writeln!(
        output,
        "- Page views: {:.0}",
        aggregate::column_sum(&period, "page_views")?
    );
    let _ = writeln!(
        output,
        "- Average session: {}s",
        opt(aggregate::column_mean(&period, "session_duration")?, 0)
    );

    let hourly = aggregate::group_by_mean(&period, "hour", "traffic")?;
    let busiest = aggregate::top_n(&hourly, 1, "traffic", true)?;
    if let Some(peak) = busiest.rows().first() {
        let _ = writeln!(
            output,
            "- Peak hour: {}:00 ({:.0} visits on average)",
            peak.values()[0],
            peak.values()[1].as_f64().unwrap_or(0.0)
        );
    }

    let heatmap = aggregate::weekday_heatmap(&period, "traffic")?;
    let _ = writeln!(output);
    let _ = writeln!(output, "### Traffic by Hour and Weekday");
    let header: Vec<&str> = heatmap
        .col_keys()
        .iter()
        .filter_map(Value::as_str)
        .map(|day| &day[..3])
        .collect();
    let _ = writeln!(output, "| hour | {} |", header.join(" | "));
    let _ = writeln!(output, "|---|{}", "---|".repeat(header.len()));
    for (key, cells) in heatmap.row_keys().iter().zip(heatmap.rows()) {
        let cells: Vec<String> = cells.iter().map(|c| opt(*c, 0)).collect();
        let _ = writeln!(output, "| {} | {} |", key, cells.join(" | "));
    }

    Ok(())
}

fn write_geography(
    output: &mut String,
    countries: &Table,
    provinces: &Table,
    config: &DashboardConfig,
) -> Result<()> {
    let _ = writeln!(output);
    let _ = writeln!(output, "## Geography");
    let _ = writeln!(
        output,
        "- Visitors: {:.0}, revenue ${:.2}, average conversion {}%",
        aggregate::column_sum(countries, "visitors")?,
        aggregate::column_sum(countries, "revenue")?,
        opt(
            aggregate::column_mean(countries, "conversion_rate")?.map(|v| v * 100.0),
            1
        )
    );

    let by_visitors = aggregate::top_n(countries, config.top_n, "visitors", true)?;
    let _ = writeln!(output);
    let _ = writeln!(output, "### Top Countries by Visitors");
    for row in 0..by_visitors.len() {
        let _ = writeln!(
            output,
            "- {} ({}): {} visitors, ${:.2}",
            text(&by_visitors, row, "country"),
            text(&by_visitors, row, "code"),
            text(&by_visitors, row, "visitors"),
            number(&by_visitors, row, "revenue")
        );
    }

    let by_revenue = aggregate::top_n(countries, config.top_n, "revenue", true)?;
    let _ = writeln!(output);
    let _ = writeln!(output, "### Top Countries by Revenue");
    for row in 0..by_revenue.len() {
        let _ = writeln!(
            output,
            "- {}: ${:.2} at {:.1}% conversion",
            text(&by_revenue, row, "country"),
            number(&by_revenue, row, "revenue"),
            number(&by_revenue, row, "conversion_rate") * 100.0
        );
    }

    let total = aggregate::column_sum(provinces, "visitors")?;
    let ranked = aggregate::sort_by(provinces, "visitors", true)?;
    let _ = writeln!(output);
    let _ = writeln!(output, "### Canada");
    for row in 0..ranked.len() {
        let visitors = number(&ranked, row, "visitors");
        let share = if total > 0.0 { visitors / total * 100.0 } else { 0.0 };
        let _ = writeln!(
            output,
            "- {} ({}): {:.0} visitors ({:.1}%)",
            text(&ranked, row, "province"),
            text(&ranked, row, "code"),
            visitors,
            share
        );
    }

    Ok(())
}

fn write_products(output: &mut String, products: &Table, config: &DashboardConfig) -> Result<()> {
    let top = aggregate::top_n(products, config.top_n, "revenue", true)?;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Products");
    for row in 0..top.len() {
        let _ = writeln!(
            output,
            "- {} [{}]: {} units, ${:.2}, rated {:.1} ({} reviews)",
            text(&top, row, "product"),
            text(&top, row, "category"),
            text(&top, row, "units_sold"),
            number(&top, row, "revenue"),
            number(&top, row, "rating"),
            text(&top, row, "reviews")
        );
    }

    let by_category = aggregate::group_by_sum(products, "category", "revenue")?;
    let _ = writeln!(output);
    let _ = writeln!(output, "### Revenue by Category");
    for row in 0..by_category.len() {
        let _ = writeln!(
            output,
            "- {}: ${:.2}",
            text(&by_category, row, "category"),
            number(&by_category, row, "revenue")
        );
    }

    Ok(())
}

fn write_marketing(output: &mut String, marketing: &Table) -> Result<()> {
    let spend = aggregate::group_by_sum(marketing, "channel", "spend")?;
    let clicks = aggregate::group_by_sum(marketing, "channel", "clicks")?;
    let conversions = aggregate::group_by_sum(marketing, "channel", "conversions")?;

    let _ = writeln!(output);
    let _ = writeln!(output, "## Marketing Channels");
    let _ = writeln!(output, "| channel | spend | clicks | conversions | cpc |");
    let _ = writeln!(output, "|---|---|---|---|---|");
    // The three group-bys share one key set, so rows line up.
    for row in 0..spend.len() {
        let total_spend = number(&spend, row, "spend");
        let total_clicks = number(&clicks, row, "clicks");
        let cpc = if total_clicks > 0.0 {
            total_spend / total_clicks
        } else {
            0.0
        };
        let _ = writeln!(
            output,
            "| {} | {:.2} | {:.0} | {:.0} | {:.2} |",
            text(&spend, row, "channel"),
            total_spend,
            total_clicks,
            number(&conversions, row, "conversions"),
            cpc
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn dashboard(config: &DashboardConfig) -> Dashboard {
        let now = NaiveDate::from_ymd_opt(2026, 10, 15)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let mut generator = Generator::new(SmallRng::seed_from_u64(2026), now);
        load_dashboard(&RefreshCache::new(), &mut generator, config).unwrap()
    }

    #[test]
    fn report_has_every_section() {
        let config = DashboardConfig::default();
        let report = build_report(&dashboard(&config), &config).unwrap();

        for heading in [
            "# Dashboard Report",
            "## Key Metrics",
            "## Goals",
            "## Revenue Trend",
            "## Traffic (last 30 days)",
            "### Traffic by Hour and Weekday",
            "### Top Countries by Visitors",
            "### Canada",
            "## Top Products",
            "## Marketing Channels",
        ] {
            assert!(report.contains(heading), "missing {heading}");
        }
        assert!(report.contains("| hour | Mon | Tue | Wed | Thu | Fri | Sat | Sun |"));
        assert!(report.contains("Peak hour:"));
    }

    #[test]
    fn trend_shows_missing_means_as_na() {
        let config = DashboardConfig {
            days: 3,
            recent_days: 4,
            ..Default::default()
        };
        let report = build_report(&dashboard(&config), &config).unwrap();
        assert_eq!(report.matches("| n/a |").count(), 4);
    }

    #[test]
    fn kpis_track_goals() {
        let config = DashboardConfig {
            sales_goal: 1.0,
            ..Default::default()
        };
        let board = dashboard(&config);
        let kpis = kpis(&board.overview, &config).unwrap();
        assert_eq!(kpis.sales_progress, 1.0);
        assert!(kpis.total_sales >= 31.0 * 50.0);
        assert!(kpis.avg_customers.is_some());
    }

    #[test]
    fn load_reuses_tables_within_a_cycle() {
        let config = DashboardConfig::default();
        let cache = RefreshCache::new();
        let now = NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut generator = Generator::new(SmallRng::seed_from_u64(1), now);

        let first = load_dashboard(&cache, &mut generator, &config).unwrap();
        let second = load_dashboard(&cache, &mut generator, &config).unwrap();
        assert!(Arc::ptr_eq(&first.traffic, &second.traffic));

        cache.refresh();
        let third = load_dashboard(&cache, &mut generator, &config).unwrap();
        assert!(!Arc::ptr_eq(&first.traffic, &third.traffic));
    }
}
