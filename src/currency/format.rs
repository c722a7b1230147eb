//! Price display formatting.

/// Display rules for a currency we know how to render natively.
struct CurrencyStyle {
    code: &'static str,
    symbol: &'static str,
    decimals: usize,
}

const KNOWN: &[CurrencyStyle] = &[
    CurrencyStyle { code: "USD", symbol: "$", decimals: 2 },
    CurrencyStyle { code: "EUR", symbol: "€", decimals: 2 },
    CurrencyStyle { code: "GBP", symbol: "£", decimals: 2 },
    CurrencyStyle { code: "EGP", symbol: "EGP", decimals: 2 },
    CurrencyStyle { code: "SAR", symbol: "SAR", decimals: 2 },
    CurrencyStyle { code: "AED", symbol: "AED", decimals: 2 },
    CurrencyStyle { code: "CAD", symbol: "CA$", decimals: 2 },
    CurrencyStyle { code: "AUD", symbol: "A$", decimals: 2 },
    CurrencyStyle { code: "JPY", symbol: "¥", decimals: 0 },
    CurrencyStyle { code: "INR", symbol: "₹", decimals: 2 },
    CurrencyStyle { code: "CNY", symbol: "CN¥", decimals: 2 },
];

/// Symbols for codes without full display rules.
const SYMBOLS: &[(&str, &str)] = &[
    ("CHF", "CHF"),
    ("SEK", "kr"),
    ("NOK", "kr"),
    ("DKK", "kr"),
    ("PLN", "zł"),
    ("TRY", "₺"),
    ("RUB", "₽"),
    ("KRW", "₩"),
    ("BRL", "R$"),
    ("MXN", "MX$"),
    ("ZAR", "R"),
    ("NGN", "₦"),
    ("PKR", "₨"),
    ("ILS", "₪"),
    ("THB", "฿"),
    ("PHP", "₱"),
    ("VND", "₫"),
    ("KWD", "KD"),
    ("QAR", "QR"),
];

/// Render `amount` in `code` for display, e.g. `$1,234.56` or `¥1,235`.
///
/// Codes outside the known table fall back to `"{symbol} {amount:.2}"`,
/// using the code itself when no symbol is on record.
pub fn format_price(amount: f64, code: &str) -> String {
    let code = code.trim().to_ascii_uppercase();

    let Some(style) = KNOWN.iter().find(|s| s.code == code) else {
        let symbol = SYMBOLS
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, s)| *s)
            .unwrap_or(code.as_str());
        return format!("{} {:.2}", symbol, amount);
    };

    let digits = format!("{:.*}", style.decimals, amount.abs());
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits.as_str(), None),
    };

    let mut number = group_thousands(int_part);
    if let Some(frac) = frac_part {
        number.push('.');
        number.push_str(frac);
    }

    let sign = if amount < 0.0 && digits.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
        "-"
    } else {
        ""
    };

    // Letter codes read better with a gap: "EGP 1,234.56".
    if style.symbol.chars().all(|c| c.is_ascii_alphabetic()) {
        format!("{}{} {}", sign, style.symbol, number)
    } else {
        format!("{}{}{}", sign, style.symbol, number)
    }
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
