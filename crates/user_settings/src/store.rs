use crate::record::{parse_menu_time_zone, validate_lead_time, SkillRange, UserSettings};
use crate::SettingsError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Flat user id → settings map backed by a JSON file.
///
/// Every successful mutation rewrites the whole file. When the write fails the
/// in-memory record is restored so memory and disk never diverge.
pub struct SettingsStore {
    path: Option<PathBuf>,
    users: BTreeMap<String, UserSettings>,
}

impl SettingsStore {
    /// Missing file → empty store. Malformed JSON is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let users: BTreeMap<String, UserSettings> = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No settings file at {:?}, starting empty", path);
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };
        info!("Loaded {} user settings from {:?}", users.len(), path);
        Ok(Self { path: Some(path), users })
    }

    /// Store without a backing file (mutations are never persisted).
    pub fn ephemeral(records: impl IntoIterator<Item = (String, UserSettings)>) -> Self {
        Self {
            path: None,
            users: records.into_iter().collect(),
        }
    }

    pub fn get(&self, user_id: &str) -> Option<&UserSettings> {
        self.users.get(user_id)
    }

    pub fn is_opted_in(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UserSettings)> {
        self.users.iter().map(|(id, s)| (id.as_str(), s))
    }

    /// Users that have a lead time configured
    pub fn notifiable(&self) -> impl Iterator<Item = (&str, &UserSettings)> {
        self.iter().filter(|(_, s)| s.notification_time.is_some())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn opt_in(&mut self, user_id: &str) -> Result<(), SettingsError> {
        if self.users.contains_key(user_id) {
            return Err(SettingsError::AlreadyOptedIn);
        }
        self.users.insert(user_id.to_string(), UserSettings::default());
        self.commit(user_id, None)
    }

    pub fn opt_out(&mut self, user_id: &str) -> Result<(), SettingsError> {
        let previous = self.users.remove(user_id).ok_or(SettingsError::NotOptedIn)?;
        self.commit(user_id, Some(previous))
    }

    pub fn set_lead_time(&mut self, user_id: &str, minutes: i64) -> Result<u32, SettingsError> {
        let minutes = validate_lead_time(minutes)?;
        self.update(user_id, |s| s.notification_time = Some(minutes))?;
        Ok(minutes)
    }

    pub fn set_time_zone(&mut self, user_id: &str, choice: &str) -> Result<&'static str, SettingsError> {
        let zone = parse_menu_time_zone(choice)?;
        self.update(user_id, |s| s.time_zone = Some(zone.to_string()))?;
        Ok(zone)
    }

    pub fn set_skill_range(&mut self, user_id: &str, choice: &str) -> Result<SkillRange, SettingsError> {
        let range: SkillRange = choice.parse()?;
        self.update(user_id, |s| s.mmr_range = Some(range))?;
        Ok(range)
    }

    fn update(&mut self, user_id: &str, apply: impl FnOnce(&mut UserSettings)) -> Result<(), SettingsError> {
        let record = self.users.get_mut(user_id).ok_or(SettingsError::NotOptedIn)?;
        let previous = record.clone();
        apply(record);
        self.commit(user_id, Some(previous))
    }

    fn commit(&mut self, user_id: &str, previous: Option<UserSettings>) -> Result<(), SettingsError> {
        if let Err(e) = self.persist() {
            match previous {
                Some(record) => {
                    self.users.insert(user_id.to_string(), record);
                }
                None => {
                    self.users.remove(user_id);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.users.serialize(&mut ser)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = tmp_path(path);
        let written = fs::write(&tmp, &buf).and_then(|()| fs::rename(&tmp, path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!("Wrote {} user settings to {:?}", self.users.len(), path);
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
