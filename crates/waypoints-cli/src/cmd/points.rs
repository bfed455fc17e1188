use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use crate::project::Project;
use anyhow::Result;
use chrono::Days;
use clap::Args;
use std::io::{self, Write};
use waypoints_core::model::DaySummary;
use waypoints_core::validate::{ValidationErrors, parse_date};

#[derive(Args, Debug)]
pub struct PointsArgs {
    /// Day to total (YYYY-MM-DD, UTC). Defaults to today.
    #[arg(long, conflicts_with = "days")]
    pub date: Option<String>,

    /// Show the last N days, ending today.
    #[arg(long)]
    pub days: Option<u32>,
}

fn write_day(w: &mut dyn Write, d: &DaySummary) -> io::Result<()> {
    writeln!(
        w,
        "{}\t{}\t{}\t{}\t{}",
        d.date, d.baseline_points, d.achievement_points, d.achievements, d.total
    )
}

fn pretty_day(w: &mut dyn Write, d: &DaySummary) -> io::Result<()> {
    pretty_section(w, &format!("Points for {}", d.date))?;
    pretty_kv(w, "baseline", d.baseline_points.to_string())?;
    pretty_kv(
        w,
        "earned",
        format!("{} ({} completion(s))", d.achievement_points, d.achievements),
    )?;
    pretty_kv(w, "total", d.total.to_string())
}

/// Execute `wp points`.
///
/// Today's total always carries a baseline: asking for it creates today's
/// baseline row if none exists. Past days without a row count the default
/// baseline but are not written.
pub fn run_points(args: &PointsArgs, output: OutputMode, project: &Project) -> Result<()> {
    let tracker = project.open()?;

    if let Some(days) = args.days.filter(|d| *d > 0) {
        let end = tracker.today();
        tracker
            .baselines()
            .ensure_daily_baseline(tracker.owner_id(), end)?;
        let start = end
            .checked_sub_days(Days::new(u64::from(days - 1)))
            .unwrap_or(end);
        let history = tracker.history(start, end)?;
        return render_mode(
            output,
            &history,
            |days, w| {
                for d in days {
                    write_day(w, d)?;
                }
                Ok(())
            },
            |days, w| {
                pretty_section(w, "Daily points")?;
                for d in days {
                    writeln!(
                        w,
                        "{}  {:>5}  (baseline {}, +{} from {} completion(s))",
                        d.date, d.total, d.baseline_points, d.achievement_points, d.achievements
                    )?;
                }
                let sum: u64 = days.iter().map(|d| d.total).sum();
                writeln!(w)?;
                pretty_kv(w, "sum", sum.to_string())
            },
        );
    }

    let summary = match args.date.as_deref() {
        Some(raw) => {
            let date = parse_date("date", raw).map_err(ValidationErrors::single)?;
            tracker
                .baselines()
                .day_total(tracker.ledger(), tracker.owner_id(), date)?
        }
        None => tracker.today_total()?,
    };

    render_mode(output, &summary, |d, w| write_day(w, d), |d, w| pretty_day(w, d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn text_row_is_tab_separated() {
        let day = DaySummary {
            date: NaiveDate::from_ymd_opt(2026, 3, 1).expect("valid date"),
            baseline_points: 10,
            achievement_points: 30,
            achievements: 2,
            total: 40,
        };
        let mut buf = Vec::new();
        write_day(&mut buf, &day).expect("write");
        assert_eq!(String::from_utf8(buf).expect("utf8"), "2026-03-01\t10\t30\t2\t40\n");
    }

    #[test]
    fn date_and_days_conflict() {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            args: PointsArgs,
        }
        assert!(Wrapper::try_parse_from(["test", "--date", "2026-01-01", "--days", "3"]).is_err());
    }
}
