use serde::{Deserialize, Serialize};
use url::Url;

use crate::site::SiteProfile;
use crate::utils::error::{AppError, Result};

/// A monitored product. The address is resolved once, when the target is built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemTarget {
    pub id: String,
    pub locator: String,
    pub address: Url,
}

impl ItemTarget {
    /// Accepts either a bare item id (`100038005189`) or a full page address.
    pub fn resolve(locator: &str, site: &SiteProfile) -> Result<Self> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(AppError::InvalidLocator {
                locator: locator.to_string(),
            });
        }

        if locator.starts_with("http://") || locator.starts_with("https://") {
            let address = Url::parse(locator).map_err(|_| AppError::InvalidLocator {
                locator: locator.to_string(),
            })?;
            let id = site
                .item_id_from_address(&address)
                .ok_or_else(|| AppError::InvalidLocator {
                    locator: locator.to_string(),
                })?;
            return Ok(Self {
                id,
                locator: locator.to_string(),
                address,
            });
        }

        if !locator.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::InvalidLocator {
                locator: locator.to_string(),
            });
        }

        let address = site
            .item_address(locator)
            .map_err(|_| AppError::InvalidLocator {
                locator: locator.to_string(),
            })?;

        Ok(Self {
            id: locator.to_string(),
            locator: locator.to_string(),
            address,
        })
    }

    pub fn resolve_all(locators: &[String], site: &SiteProfile) -> Result<Vec<Self>> {
        locators
            .iter()
            .map(|locator| Self::resolve(locator, site))
            .collect()
    }
}
