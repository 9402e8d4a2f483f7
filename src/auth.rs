// Access gate for reference table updates.
//
// A fixed allow-list kept in memory. It only keeps casual users from replacing
// the reference files; it is not a security boundary.
use crate::error::PriceError;
use once_cell::sync::Lazy;
use std::collections::HashSet;

static AUTHORIZED_CODES: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["GPC-7341", "GPC-2958", "SUP-0416"].into_iter().collect());

pub fn is_authorized(code: &str) -> bool {
    AUTHORIZED_CODES.contains(code.trim())
}

pub fn authorize(code: &str) -> Result<(), PriceError> {
    if is_authorized(code) {
        Ok(())
    } else {
        Err(PriceError::Unauthorized)
    }
}

#[cfg(test)]
pub(crate) const TEST_CODE: &str = "GPC-7341";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_listed_codes() {
        assert!(is_authorized(TEST_CODE));
        assert!(is_authorized(" SUP-0416 "));
    }

    #[test]
    fn rejects_anything_else() {
        assert!(!is_authorized(""));
        assert!(!is_authorized("gpc-7341"));
        assert!(matches!(authorize("1234"), Err(PriceError::Unauthorized)));
    }
}
