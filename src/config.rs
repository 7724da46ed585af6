//! Input loading and parsing.
//!
//! This module handles:
//! - Loading and parsing the profile JSON file
//! - The closed set of outing reasons
//! - Outing date/time and the date formats printed on the attestation
//! - Reading the template PDF

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use clap::ValueEnum;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Date format used for every date printed on the attestation
pub const DATE_FMT: &str = "%d/%m/%Y";

/// Time format used for every time printed on the attestation
pub const TIME_FMT: &str = "%Hh%M";

/// Date of birth, accepted as `YYYY-MM-DD` or as a full RFC 3339 timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BirthDate(pub NaiveDate);

impl BirthDate {
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Ok(BirthDate(date));
        }
        DateTime::parse_from_rfc3339(value)
            .map(|dt| BirthDate(dt.date_naive()))
            .map_err(|_| anyhow!("invalid date of birth: {:?}", value))
    }

    pub fn formatted(&self) -> String {
        self.0.format(DATE_FMT).to_string()
    }
}

impl<'de> Deserialize<'de> for BirthDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        BirthDate::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: BirthDate,
    pub place_of_birth: String,
    pub address: String,
    pub city: String,
    pub zip: String,
}

impl Profile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Outing reasons printed as checkboxes on the first page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum ReasonKey {
    Travail,
    Achats,
    Sante,
    Famille,
    Handicap,
    SportAnimaux,
    Convocation,
    Missions,
    Enfants,
}

impl ReasonKey {
    /// Key as written in the QR payload
    pub fn key(&self) -> &'static str {
        match self {
            ReasonKey::Travail => "travail",
            ReasonKey::Achats => "achats",
            ReasonKey::Sante => "sante",
            ReasonKey::Famille => "famille",
            ReasonKey::Handicap => "handicap",
            ReasonKey::SportAnimaux => "sport_animaux",
            ReasonKey::Convocation => "convocation",
            ReasonKey::Missions => "missions",
            ReasonKey::Enfants => "enfants",
        }
    }
}

impl fmt::Display for ReasonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Date and time the holder leaves home
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outing(pub NaiveDateTime);

impl Outing {
    /// Build an outing from optional `dd/mm/yyyy` and `HHhMM` strings,
    /// filling the missing parts from `now`
    pub fn from_parts(date: Option<&str>, time: Option<&str>, now: NaiveDateTime) -> Result<Self> {
        let date = match date {
            Some(d) => NaiveDate::parse_from_str(d.trim(), DATE_FMT)
                .with_context(|| format!("Invalid outing date {:?}, expected dd/mm/yyyy", d))?,
            None => now.date(),
        };
        let time = match time {
            Some(t) => parse_time(t)?,
            None => now.time(),
        };
        Ok(Outing(date.and_time(time)))
    }

    pub fn date_str(&self) -> String {
        self.0.format(DATE_FMT).to_string()
    }

    pub fn time_str(&self) -> String {
        self.0.format(TIME_FMT).to_string()
    }
}

/// Accepts `14h30` as printed on the form, and `14:30` for convenience
fn parse_time(value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, TIME_FMT)
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .with_context(|| format!("Invalid outing time {:?}, expected HHhMM", value))
}

/// Helper function to open a file with consistent error context
fn open_file_with_context(path: &Path, description: &str) -> Result<File> {
    File::open(path)
        .with_context(|| format!("Failed to open {} at {:?}", description, path))
}

pub fn load_profile(path: &Path) -> Result<Profile> {
    let file = open_file_with_context(path, "profile")?;
    let reader = BufReader::new(file);
    let profile: Profile = serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse profile {:?}", path))?;
    Ok(profile)
}

pub fn load_template(path: &Path) -> Result<Vec<u8>> {
    let file = open_file_with_context(path, "template PDF")?;
    let mut buf = Vec::new();
    let mut reader = BufReader::new(file);
    reader.read_to_end(&mut buf)
        .with_context(|| format!("Failed to read template {:?}", path))?;
    Ok(buf)
}
