//! Transaction date normalization.
//!
//! The dataset writes dates as `DD/MM/YY`; graph stores expect ISO 8601
//! `YYYY-MM-DD`. Two-digit years follow chrono's `%y` rule: low values
//! land in the 2000s, high values in the 1900s.

use crate::CardGraphError;
use chrono::NaiveDate;

const SOURCE_FORMAT: &str = "%d/%m/%y";
const ISO_FORMAT: &str = "%Y-%m-%d";

/// Convert a `DD/MM/YY` date string to `YYYY-MM-DD`.
pub fn normalize_date(raw: &str) -> Result<String, CardGraphError> {
    let date = NaiveDate::parse_from_str(raw.trim(), SOURCE_FORMAT)
        .map_err(|_| CardGraphError::InvalidDate(raw.to_string()))?;
    Ok(date.format(ISO_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_day_month_year() {
        assert_eq!(normalize_date("21/05/23").expect("date"), "2023-05-21");
        assert_eq!(normalize_date("01/01/19").expect("date"), "2019-01-01");
    }

    #[test]
    fn two_digit_year_pivot() {
        assert_eq!(normalize_date("31/12/05").expect("date"), "2005-12-31");
        assert_eq!(normalize_date("31/12/99").expect("date"), "1999-12-31");
    }

    #[test]
    fn rejects_iso_input() {
        assert!(matches!(
            normalize_date("2023-05-21"),
            Err(CardGraphError::InvalidDate(_))
        ));
    }

    #[test]
    fn rejects_impossible_dates() {
        assert!(normalize_date("31/02/23").is_err());
        assert!(normalize_date("").is_err());
    }
}
