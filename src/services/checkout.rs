use crate::descriptor::{DescriptorStore, FIELD_CHECKOUT};
use crate::error::AppError;

/// How the advisory lock was obtained, or why it was not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    /// Lock was free and is now ours.
    Claimed,
    /// We already held it, e.g. after a crash mid-session.
    AlreadyOwned,
    /// Another host held it and the user chose to take it over.
    Overridden { previous: String },
    /// Another host holds it and the user backed off. Nothing was written.
    Declined { holder: String },
}

impl Acquisition {
    pub fn proceeds(&self) -> bool {
        !matches!(self, Acquisition::Declined { .. })
    }
}

pub struct CheckoutService;

impl CheckoutService {
    pub fn current_holder(
        descriptors: &dyn DescriptorStore,
        profile_id: &str,
    ) -> Result<Option<String>, AppError> {
        Ok(descriptors
            .read(profile_id, FIELD_CHECKOUT)?
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty()))
    }

    /// Run the checkout protocol for `hostname`. `confirm_override` is only consulted when
    /// another host holds the lock, and receives that host's name.
    ///
    /// There is no compare-and-swap here; two hosts racing within the same few seconds can both
    /// believe they won.
    pub fn acquire(
        descriptors: &dyn DescriptorStore,
        profile_id: &str,
        hostname: &str,
        confirm_override: impl FnOnce(&str) -> bool,
    ) -> Result<Acquisition, AppError> {
        match Self::current_holder(descriptors, profile_id)? {
            None => {
                descriptors.write(profile_id, FIELD_CHECKOUT, hostname)?;
                log::info!("checkout claimed by {hostname}");
                Ok(Acquisition::Claimed)
            }
            Some(holder) if holder == hostname => {
                log::info!("checkout already held by this host ({hostname})");
                Ok(Acquisition::AlreadyOwned)
            }
            Some(holder) => {
                log::info!("checkout contested: held by {holder}");
                if !confirm_override(&holder) {
                    log::info!("override declined, leaving checkout with {holder}");
                    return Ok(Acquisition::Declined { holder });
                }
                descriptors.write(profile_id, FIELD_CHECKOUT, hostname)?;
                log::warn!("checkout overridden: {holder} -> {hostname}");
                Ok(Acquisition::Overridden { previous: holder })
            }
        }
    }

    /// Clear the lock. Safe to call when it is already clear.
    pub fn release(descriptors: &dyn DescriptorStore, profile_id: &str) -> Result<(), AppError> {
        descriptors.write(profile_id, FIELD_CHECKOUT, "")?;
        log::info!("checkout released for {profile_id}");
        Ok(())
    }
}
