//! Static country lookup tables: ISO 3166-1 alpha-2 code to display name
//! and to ISO 4217 currency.

struct Country {
    code: &'static str,
    name: &'static str,
    currency: &'static str,
}

const COUNTRIES: &[Country] = &[
    Country { code: "US", name: "United States", currency: "USD" },
    Country { code: "CA", name: "Canada", currency: "CAD" },
    Country { code: "MX", name: "Mexico", currency: "MXN" },
    Country { code: "BR", name: "Brazil", currency: "BRL" },
    Country { code: "AR", name: "Argentina", currency: "ARS" },
    Country { code: "CO", name: "Colombia", currency: "COP" },
    Country { code: "PE", name: "Peru", currency: "PEN" },
    Country { code: "CL", name: "Chile", currency: "CLP" },
    Country { code: "GB", name: "United Kingdom", currency: "GBP" },
    Country { code: "IE", name: "Ireland", currency: "EUR" },
    Country { code: "FR", name: "France", currency: "EUR" },
    Country { code: "DE", name: "Germany", currency: "EUR" },
    Country { code: "IT", name: "Italy", currency: "EUR" },
    Country { code: "ES", name: "Spain", currency: "EUR" },
    Country { code: "PT", name: "Portugal", currency: "EUR" },
    Country { code: "NL", name: "Netherlands", currency: "EUR" },
    Country { code: "BE", name: "Belgium", currency: "EUR" },
    Country { code: "AT", name: "Austria", currency: "EUR" },
    Country { code: "FI", name: "Finland", currency: "EUR" },
    Country { code: "GR", name: "Greece", currency: "EUR" },
    Country { code: "CH", name: "Switzerland", currency: "CHF" },
    Country { code: "SE", name: "Sweden", currency: "SEK" },
    Country { code: "NO", name: "Norway", currency: "NOK" },
    Country { code: "DK", name: "Denmark", currency: "DKK" },
    Country { code: "IS", name: "Iceland", currency: "ISK" },
    Country { code: "PL", name: "Poland", currency: "PLN" },
    Country { code: "CZ", name: "Czech Republic", currency: "CZK" },
    Country { code: "HU", name: "Hungary", currency: "HUF" },
    Country { code: "RO", name: "Romania", currency: "RON" },
    Country { code: "RU", name: "Russia", currency: "RUB" },
    Country { code: "TR", name: "Turkey", currency: "TRY" },
    Country { code: "EG", name: "Egypt", currency: "EGP" },
    Country { code: "SA", name: "Saudi Arabia", currency: "SAR" },
    Country { code: "AE", name: "United Arab Emirates", currency: "AED" },
    Country { code: "QA", name: "Qatar", currency: "QAR" },
    Country { code: "KW", name: "Kuwait", currency: "KWD" },
    Country { code: "BH", name: "Bahrain", currency: "BHD" },
    Country { code: "OM", name: "Oman", currency: "OMR" },
    Country { code: "JO", name: "Jordan", currency: "JOD" },
    Country { code: "LB", name: "Lebanon", currency: "LBP" },
    Country { code: "IL", name: "Israel", currency: "ILS" },
    Country { code: "IQ", name: "Iraq", currency: "IQD" },
    Country { code: "IR", name: "Iran", currency: "IRR" },
    Country { code: "MA", name: "Morocco", currency: "MAD" },
    Country { code: "TN", name: "Tunisia", currency: "TND" },
    Country { code: "DZ", name: "Algeria", currency: "DZD" },
    Country { code: "NG", name: "Nigeria", currency: "NGN" },
    Country { code: "KE", name: "Kenya", currency: "KES" },
    Country { code: "ZA", name: "South Africa", currency: "ZAR" },
    Country { code: "ET", name: "Ethiopia", currency: "ETB" },
    Country { code: "IN", name: "India", currency: "INR" },
    Country { code: "PK", name: "Pakistan", currency: "PKR" },
    Country { code: "BD", name: "Bangladesh", currency: "BDT" },
    Country { code: "LK", name: "Sri Lanka", currency: "LKR" },
    Country { code: "CN", name: "China", currency: "CNY" },
    Country { code: "JP", name: "Japan", currency: "JPY" },
    Country { code: "KR", name: "South Korea", currency: "KRW" },
    Country { code: "ID", name: "Indonesia", currency: "IDR" },
    Country { code: "MY", name: "Malaysia", currency: "MYR" },
    Country { code: "SG", name: "Singapore", currency: "SGD" },
    Country { code: "TH", name: "Thailand", currency: "THB" },
    Country { code: "VN", name: "Vietnam", currency: "VND" },
    Country { code: "PH", name: "Philippines", currency: "PHP" },
    Country { code: "AU", name: "Australia", currency: "AUD" },
    Country { code: "NZ", name: "New Zealand", currency: "NZD" },
];

fn find(code: &str) -> Option<&'static Country> {
    let code = code.trim();
    COUNTRIES.iter().find(|c| c.code.eq_ignore_ascii_case(code))
}

/// Currency used in a country, by alpha-2 code.
pub fn currency_for_country(code: &str) -> Option<&'static str> {
    find(code).map(|c| c.currency)
}

/// English display name of a country, by alpha-2 code.
pub fn country_name(code: &str) -> Option<&'static str> {
    find(code).map(|c| c.name)
}

/// Reverse lookup by English name, for upstream payloads that only carry a name.
pub fn country_code_for_name(name: &str) -> Option<&'static str> {
    let n = name.trim();
    COUNTRIES
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(n))
        .map(|c| c.code)
        .or_else(|| match n.to_lowercase().as_str() {
            "united states of america" | "usa" => Some("US"),
            "uk" | "great britain" | "england" => Some("GB"),
            "uae" | "emirates" => Some("AE"),
            "czechia" => Some("CZ"),
            "türkiye" => Some("TR"),
            "russian federation" => Some("RU"),
            "korea, republic of" => Some("KR"),
            "viet nam" => Some("VN"),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_lookup() {
        assert_eq!(currency_for_country("EG"), Some("EGP"));
        assert_eq!(currency_for_country("de"), Some("EUR"));
        assert_eq!(currency_for_country("ZZ"), None);
    }

    #[test]
    fn test_name_lookup() {
        assert_eq!(country_name("SA"), Some("Saudi Arabia"));
        assert_eq!(country_name("??"), None);
    }

    #[test]
    fn test_reverse_name_lookup() {
        assert_eq!(country_code_for_name("Egypt"), Some("EG"));
        assert_eq!(country_code_for_name("United States of America"), Some("US"));
        assert_eq!(country_code_for_name("Atlantis"), None);
    }

    #[test]
    fn test_codes_are_unique() {
        for (i, a) in COUNTRIES.iter().enumerate() {
            assert!(COUNTRIES[i + 1..].iter().all(|b| b.code != a.code), "{}", a.code);
        }
    }
}
