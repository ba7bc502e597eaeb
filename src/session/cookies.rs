//! Cookie bag persistence
//!
//! The bag is the JSON file a browser session was exported to. Two layouts are
//! accepted: a storage-state object (`{"cookies": [...], "origins": [...]}`) and a
//! bare array of cookies. Saving writes the same layout back and keeps any cookie
//! attributes the scanner does not interpret.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;

/// Errors raised while reading or writing a cookie bag
#[derive(Debug, Error)]
pub enum CookieBagError {
    #[error("Failed to access cookie file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed cookie file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cookie file must hold an array or an object with a 'cookies' array")]
    UnsupportedLayout,
}

/// A single session cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Attributes kept verbatim (expires, httpOnly, secure, sameSite, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_path() -> String {
    "/".to_string()
}

impl Cookie {
    pub fn new(name: &str, value: &str, domain: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            domain: domain.to_string(),
            path: path.to_string(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Layout {
    StorageState { origins: Value },
    BareList,
}

/// The full set of session cookies loaded from disk
#[derive(Debug, Clone, PartialEq)]
pub struct CookieBag {
    pub cookies: Vec<Cookie>,
    layout: Layout,
}

impl CookieBag {
    /// Creates an empty bag that saves as a storage-state object
    pub fn new(cookies: Vec<Cookie>) -> Self {
        Self {
            cookies,
            layout: Layout::StorageState {
                origins: Value::Array(Vec::new()),
            },
        }
    }

    /// Parses a bag from JSON text
    pub fn from_json(content: &str) -> Result<Self, CookieBagError> {
        let value: Value = serde_json::from_str(content)?;
        match value {
            Value::Array(_) => Ok(Self {
                cookies: serde_json::from_value(value)?,
                layout: Layout::BareList,
            }),
            Value::Object(mut object) => {
                let cookies = object
                    .remove("cookies")
                    .ok_or(CookieBagError::UnsupportedLayout)?;
                let origins = object
                    .remove("origins")
                    .unwrap_or_else(|| Value::Array(Vec::new()));
                Ok(Self {
                    cookies: serde_json::from_value(cookies)?,
                    layout: Layout::StorageState { origins },
                })
            }
            _ => Err(CookieBagError::UnsupportedLayout),
        }
    }

    /// Serializes the bag in the layout it was loaded from
    pub fn to_json(&self) -> Result<String, CookieBagError> {
        let cookies = serde_json::to_value(&self.cookies)?;
        let value = match &self.layout {
            Layout::BareList => cookies,
            Layout::StorageState { origins } => {
                let mut object = Map::new();
                object.insert("cookies".to_string(), cookies);
                object.insert("origins".to_string(), origins.clone());
                Value::Object(object)
            }
        };
        Ok(serde_json::to_string_pretty(&value)?)
    }

    /// Loads a bag from a file
    pub fn load(path: &Path) -> Result<Self, CookieBagError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Writes the bag back to a file
    pub fn save(&self, path: &Path) -> Result<(), CookieBagError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Returns the cookie with the given name, if present
    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    /// Sets the value of a named cookie, adding it when missing
    ///
    /// Returns true if an existing cookie was updated.
    pub fn upsert(&mut self, name: &str, value: &str, domain: &str) -> bool {
        if let Some(cookie) = self.cookies.iter_mut().find(|c| c.name == name) {
            cookie.value = value.to_string();
            return true;
        }
        self.cookies.push(Cookie::new(name, value, domain, "/"));
        false
    }

    /// Removes every cookie with the given name
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.cookies.len();
        self.cookies.retain(|c| c.name != name);
        before - self.cookies.len()
    }
}
