use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Informal part of the day an order or an assignment occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Matin,
    Soir,
    Nuit,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Matin, Slot::Soir, Slot::Nuit];
}

/// Start and end time of one window; an end at or before the start crosses midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn crosses_midnight(&self) -> bool {
        self.end <= self.start
    }

    /// Duration in minutes, accounting for the midnight wrap
    pub fn minutes(&self) -> u32 {
        let start = minutes_of(self.start);
        let end = minutes_of(self.end);
        if self.crosses_midnight() {
            24 * 60 - start + end
        } else {
            end - start
        }
    }
}

fn minutes_of(time: NaiveTime) -> u32 {
    use chrono::Timelike;
    time.hour() * 60 + time.minute()
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_window(self))
    }
}

/// Morning, evening and night windows of an order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "HorairesColumns", into = "HorairesColumns")]
pub struct Horaires {
    pub matin: Option<TimeWindow>,
    pub soir: Option<TimeWindow>,
    pub nuit: Option<TimeWindow>,
}

/// Column layout used by the platform tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HorairesColumns {
    #[serde(default)]
    heure_debut_matin: Option<NaiveTime>,
    #[serde(default)]
    heure_fin_matin: Option<NaiveTime>,
    #[serde(default)]
    heure_debut_soir: Option<NaiveTime>,
    #[serde(default)]
    heure_fin_soir: Option<NaiveTime>,
    #[serde(default)]
    heure_debut_nuit: Option<NaiveTime>,
    #[serde(default)]
    heure_fin_nuit: Option<NaiveTime>,
}

fn window_from(start: Option<NaiveTime>, end: Option<NaiveTime>) -> Option<TimeWindow> {
    match (start, end) {
        (Some(start), Some(end)) => Some(TimeWindow::new(start, end)),
        _ => None,
    }
}

impl From<HorairesColumns> for Horaires {
    fn from(cols: HorairesColumns) -> Self {
        Self {
            matin: window_from(cols.heure_debut_matin, cols.heure_fin_matin),
            soir: window_from(cols.heure_debut_soir, cols.heure_fin_soir),
            nuit: window_from(cols.heure_debut_nuit, cols.heure_fin_nuit),
        }
    }
}

impl From<Horaires> for HorairesColumns {
    fn from(h: Horaires) -> Self {
        Self {
            heure_debut_matin: h.matin.map(|w| w.start),
            heure_fin_matin: h.matin.map(|w| w.end),
            heure_debut_soir: h.soir.map(|w| w.start),
            heure_fin_soir: h.soir.map(|w| w.end),
            heure_debut_nuit: h.nuit.map(|w| w.start),
            heure_fin_nuit: h.nuit.map(|w| w.end),
        }
    }
}

/// Classification shown to staff for a set of windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Creneau {
    Matin,
    Soir,
    Nuit,
    Coupure,
    Journee,
    Mixte,
}

impl Horaires {
    pub fn matin(window: TimeWindow) -> Self {
        Self { matin: Some(window), ..Self::default() }
    }

    pub fn soir(window: TimeWindow) -> Self {
        Self { soir: Some(window), ..Self::default() }
    }

    pub fn nuit(window: TimeWindow) -> Self {
        Self { nuit: Some(window), ..Self::default() }
    }

    pub fn coupure(matin: TimeWindow, soir: TimeWindow) -> Self {
        Self { matin: Some(matin), soir: Some(soir), nuit: None }
    }

    pub fn is_empty(&self) -> bool {
        self.matin.is_none() && self.soir.is_none() && self.nuit.is_none()
    }

    /// Slots occupied; no window at all means the whole day
    pub fn slots(&self) -> BTreeSet<Slot> {
        if self.is_empty() {
            return Slot::ALL.into_iter().collect();
        }
        let mut slots = BTreeSet::new();
        if self.matin.is_some() {
            slots.insert(Slot::Matin);
        }
        if self.soir.is_some() {
            slots.insert(Slot::Soir);
        }
        if self.nuit.is_some() {
            slots.insert(Slot::Nuit);
        }
        slots
    }

    pub fn creneau(&self) -> Creneau {
        match (self.matin.is_some(), self.soir.is_some(), self.nuit.is_some()) {
            (false, false, false) => Creneau::Journee,
            (true, false, false) => Creneau::Matin,
            (false, true, false) => Creneau::Soir,
            (false, false, true) => Creneau::Nuit,
            (true, true, false) => Creneau::Coupure,
            _ => Creneau::Mixte,
        }
    }

    /// Two schedules conflict when they share at least one slot
    pub fn conflicts_with(&self, other: &Horaires) -> bool {
        let mine = self.slots();
        other.slots().iter().any(|s| mine.contains(s))
    }

    pub fn windows(&self) -> Vec<(Slot, TimeWindow)> {
        [(Slot::Matin, self.matin), (Slot::Soir, self.soir), (Slot::Nuit, self.nuit)]
            .into_iter()
            .filter_map(|(slot, w)| w.map(|w| (slot, w)))
            .collect()
    }

    pub fn total_minutes(&self) -> u32 {
        self.windows().iter().map(|(_, w)| w.minutes()).sum()
    }
}

impl fmt::Display for Horaires {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("journée");
        }
        let parts: Vec<String> = self.windows().iter().map(|(_, w)| w.to_string()).collect();
        f.write_str(&parts.join(" / "))
    }
}

/// Parses "HH:MM" (or "HH:MM:SS") to a time
pub fn parse_time(time_str: &str) -> Option<NaiveTime> {
    let clean = time_str.trim().replace('h', ":");
    let clean = if clean.ends_with(':') { format!("{}00", clean) } else { clean };
    NaiveTime::parse_from_str(&clean, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&clean, "%H:%M:%S"))
        .ok()
}

/// Parses an optional start/end pair; both or neither must be given
pub fn parse_window(start: Option<&str>, end: Option<&str>) -> Result<Option<TimeWindow>, String> {
    let start = start.map(str::trim).filter(|s| !s.is_empty());
    let end = end.map(str::trim).filter(|s| !s.is_empty());
    match (start, end) {
        (None, None) => Ok(None),
        (Some(s), Some(e)) => {
            let start = parse_time(s).ok_or_else(|| format!("Invalid time: {}", s))?;
            let end = parse_time(e).ok_or_else(|| format!("Invalid time: {}", e))?;
            Ok(Some(TimeWindow::new(start, end)))
        }
        _ => Err("Both start and end times are required".to_string()),
    }
}

/// Formats a time as HH:MM
pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// "HH:MM-HH:MM"
pub fn format_window(window: &TimeWindow) -> String {
    format!("{}-{}", format_time(window.start), format_time(window.end))
}
