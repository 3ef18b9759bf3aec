//! Display projection.
//!
//! Pure functions from an [`AppState`] snapshot to what the menu bar host
//! shows: the compact [`title`] and the ordered [`menu_entries`]. Run them
//! inside [`StateStore::read`](crate::StateStore::read) so the snapshot is
//! consistent.

use time::{Duration, OffsetDateTime};

use airmenu_types::{MetricKey, Reading};

use crate::state::AppState;

/// Suffix appended to the title while an error is recorded.
pub const ERROR_SUFFIX: &str = "(err)";

/// Renders one metric of a reading.
pub type MetricFormatter = fn(&Reading) -> String;

fn format_co2(r: &Reading) -> String {
    format!("CO2: {} ppm", r.co2 as i64)
}

fn format_pm25(r: &Reading) -> String {
    format!("PM2.5: {} µg/m3", r.pm25 as i64)
}

fn format_temp(r: &Reading) -> String {
    format!("Temp.: {:.1} °C", r.temp)
}

fn format_humidity(r: &Reading) -> String {
    format!("Hum.: {:.1}%", r.humidity)
}

fn format_radon(r: &Reading) -> String {
    format!("Radon: {:.1} Bq/m3", r.radon_short_term_avg)
}

fn format_pm1(r: &Reading) -> String {
    format!("PM1: {} µg/m3", r.pm1 as i64)
}

fn format_voc(r: &Reading) -> String {
    format!("VOC: {} ppb", r.voc as i64)
}

/// Formatter for each metric. Integer metrics truncate toward zero.
static METRIC_FORMATS: [(MetricKey, MetricFormatter); 7] = [
    (MetricKey::Co2, format_co2),
    (MetricKey::Pm25, format_pm25),
    (MetricKey::Temp, format_temp),
    (MetricKey::Humidity, format_humidity),
    (MetricKey::Radon, format_radon),
    (MetricKey::Pm1, format_pm1),
    (MetricKey::Voc, format_voc),
];

/// Render `metric` of `reading` with its unit.
///
/// ```
/// use airmenu_core::projection::format_metric;
/// use airmenu_types::{MetricKey, Reading};
///
/// let reading = Reading { co2: 412.7, temp: 21.24, ..Reading::default() };
/// assert_eq!(format_metric(MetricKey::Co2, &reading), "CO2: 412 ppm");
/// assert_eq!(format_metric(MetricKey::Temp, &reading), "Temp.: 21.2 °C");
/// ```
pub fn format_metric(metric: MetricKey, reading: &Reading) -> String {
    METRIC_FORMATS
        .iter()
        .find(|(key, _)| *key == metric)
        .map(|(_, format)| format(reading))
        .unwrap_or_default()
}

/// The menu bar title.
///
/// Empty unless both a reading and a focused metric exist; `"(err)"` is
/// appended whenever an error is recorded.
pub fn title(state: &AppState) -> String {
    let mut title = match (state.reading(), state.focused_metric()) {
        (Some(reading), Some(metric)) => format_metric(metric, reading),
        _ => String::new(),
    };
    if state.error().is_some() {
        title.push_str(ERROR_SUFFIX);
    }
    title
}

/// Human-readable age of a reading, rounded down to whole units.
///
/// Negative ages (clock skew) read as zero minutes.
///
/// ```
/// use airmenu_core::projection::time_ago;
/// use time::Duration;
///
/// assert_eq!(time_ago(Duration::minutes(1)), "1 minute ago");
/// assert_eq!(time_ago(Duration::minutes(119)), "1 hour ago");
/// assert_eq!(time_ago(Duration::days(3)), "3 days ago");
/// ```
pub fn time_ago(age: Duration) -> String {
    let minutes = age.whole_minutes().max(0);
    if minutes < 60 {
        return plural(minutes, "minute");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return plural(hours, "hour");
    }
    plural(hours / 24, "day")
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", count, unit)
    }
}

/// What activating a menu entry does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    /// Focus the metric, or clear the focus if it is already focused.
    ToggleMetric(MetricKey),
    /// Make the device the polled one.
    SelectDevice(String),
    /// Prompt for new credentials, then poll once.
    ResetCredentials,
}

/// One row of the menu.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MenuEntry {
    pub label: String,
    /// `None` for display-only rows.
    pub action: Option<MenuAction>,
    /// `Some` for rows that show a check state.
    pub selected: Option<bool>,
    pub separator: bool,
    /// Submenu rows.
    pub children: Vec<MenuEntry>,
}

impl MenuEntry {
    /// A display-only row.
    pub fn text(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn separator() -> Self {
        Self {
            separator: true,
            ..Self::default()
        }
    }

    pub fn with_action(mut self, action: MenuAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = Some(selected);
        self
    }

    pub fn with_children(mut self, children: Vec<MenuEntry>) -> Self {
        self.children = children;
        self
    }
}

/// The full menu, top to bottom.
///
/// `now` is used to age the reading.
pub fn menu_entries(state: &AppState, now: OffsetDateTime) -> Vec<MenuEntry> {
    let mut entries = Vec::new();

    match state.reading() {
        Some(reading) => {
            let focused = state.focused_metric();
            entries.extend(MetricKey::ALL.into_iter().map(|metric| {
                MenuEntry::text(format_metric(metric, reading))
                    .with_action(MenuAction::ToggleMetric(metric))
                    .with_selected(focused == Some(metric))
            }));
            let age = Duration::seconds(now.unix_timestamp().saturating_sub(reading.time));
            entries.push(MenuEntry::text(format!("Updated {}", time_ago(age))));
        }
        None => entries.push(MenuEntry::text("Getting data...")),
    }

    entries.push(MenuEntry::separator());

    if state.devices().is_empty() {
        entries.push(MenuEntry::text("Getting devices..."));
    } else {
        let selected = state.selected_device();
        let devices = state
            .devices()
            .iter()
            .map(|device| {
                MenuEntry::text(device.product_name.clone())
                    .with_action(MenuAction::SelectDevice(device.id.clone()))
                    .with_selected(selected == Some(device.id.as_str()))
            })
            .collect();
        entries.push(MenuEntry::text("Devices").with_children(devices));
    }

    entries.push(MenuEntry::separator());

    if let Some(error) = state.error() {
        entries.push(MenuEntry::text(error.to_string()));
    }

    entries.push(MenuEntry::text("Reset credentials").with_action(MenuAction::ResetCredentials));

    entries
}
