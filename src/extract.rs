//! Extract rate quotes from raw HTML.
//!
//! Bank pages publish CDT ladders as HTML tables with Spanish headers
//! ("Plazo", "Tasa E.A."), in Colombian number format ("9,50 %"). Neobank
//! pages publish one flat savings rate somewhere in marketing copy. Both
//! paths normalize to plain `(term_days, annual_rate_pct)` pairs; no DOM
//! rendering happens here — callers hand in whatever HTML their fetch
//! strategy produced.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

/// Header/context keywords marking a table as rate-bearing.
const TABLE_KEYWORDS: &[&str] = &["cdt", "tasa", "plazo", "inversión", "inversion", "depósito", "deposito"];

/// Header keywords for the term column.
const TERM_KEYWORDS: &[&str] = &["plazo", "días", "dias", "meses", "periodo", "término", "termino"];

/// Header keywords for the rate column.
const RATE_KEYWORDS: &[&str] = &["tasa", "e.a", "ea", "rendimiento", "interés", "interes", "%"];

fn rate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,3}(?:[.,]\d{1,4})?)\s*%").unwrap())
}

/// Parse a rate cell ("9,50 % E.A.", "0.095", "10 %") into percent.
///
/// Values at or below 1 are read as fractions and scaled to percent, the
/// same heuristic the upstream pages force on us: "0.095" and "9,5%" both
/// mean nine and a half percent effective annual.
pub fn parse_rate_pct(text: &str) -> Option<f64> {
    let cleaned = text
        .trim()
        .replace('%', "")
        .replace("E.A.", "")
        .replace("e.a.", "")
        .replace("EA", "")
        .replace("ea", "")
        .replace(',', ".")
        .replace(' ', "");
    let value: f64 = cleaned.parse().ok()?;
    let pct = if value > 1.0 { value } else { value * 100.0 };
    Some((pct * 100.0).round() / 100.0)
}

/// Parse a term cell into days: "90 días", "3 meses", "1 año", or a bare
/// number (≤ 36 reads as months, the convention on comparison tables).
pub fn parse_term_days(text: &str) -> Option<u32> {
    static DAYS: OnceLock<Regex> = OnceLock::new();
    static MONTHS: OnceLock<Regex> = OnceLock::new();
    static YEARS: OnceLock<Regex> = OnceLock::new();
    static BARE: OnceLock<Regex> = OnceLock::new();

    let text = text.trim().to_lowercase();
    let days = DAYS.get_or_init(|| Regex::new(r"(\d+)\s*d[ií]as?").unwrap());
    let months = MONTHS.get_or_init(|| Regex::new(r"(\d+)\s*mes(?:es)?").unwrap());
    let years = YEARS.get_or_init(|| Regex::new(r"(\d+)\s*a[ñn]os?").unwrap());
    let bare = BARE.get_or_init(|| Regex::new(r"(\d+)").unwrap());

    if let Some(c) = days.captures(&text) {
        return c[1].parse().ok();
    }
    if let Some(c) = months.captures(&text) {
        return c[1].parse::<u32>().ok().map(|m| m * 30);
    }
    if let Some(c) = years.captures(&text) {
        return c[1].parse::<u32>().ok().map(|y| y * 365);
    }
    if let Some(c) = bare.captures(&text) {
        let n: u32 = c[1].parse().ok()?;
        return Some(if n <= 36 { n * 30 } else { n });
    }
    None
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn looks_like_rate(text: &str) -> bool {
    rate_regex().is_match(text) || text.to_lowercase().contains("e.a")
}

fn looks_like_term(text: &str) -> bool {
    let lower = text.to_lowercase();
    static TERMISH: OnceLock<Regex> = OnceLock::new();
    let re = TERMISH.get_or_init(|| Regex::new(r"\d+\s*(d[ií]as?|mes(es)?)").unwrap());
    re.is_match(&lower)
}

/// Extract `(term_days, annual_rate_pct)` pairs from every rate-bearing
/// table in the document.
///
/// Column positions are found from header keywords first, then by sniffing
/// the first data row when headers are unhelpful. Rows that don't yield both
/// a term and a rate are skipped; duplicates across tables are collapsed.
pub fn extract_term_rates(html: &str) -> Vec<(u32, f64)> {
    let document = Html::parse_document(html);
    let table_sel = Selector::parse("table").unwrap();
    let row_sel = Selector::parse("tr").unwrap();
    let cell_sel = Selector::parse("th, td").unwrap();

    let mut pairs: Vec<(u32, f64)> = Vec::new();

    for table in document.select(&table_sel) {
        let table_text = element_text(&table).to_lowercase();
        if !contains_any(&table_text, TABLE_KEYWORDS) {
            continue;
        }

        let rows: Vec<ElementRef<'_>> = table.select(&row_sel).collect();
        if rows.len() < 2 {
            continue;
        }

        let headers: Vec<String> = rows[0]
            .select(&cell_sel)
            .map(|c| element_text(&c).trim().to_lowercase())
            .collect();

        let mut term_col = headers.iter().position(|h| contains_any(h, TERM_KEYWORDS));
        let mut rate_col = headers.iter().position(|h| contains_any(h, RATE_KEYWORDS));

        // Headers told us nothing — sniff the first data row instead.
        if rate_col.is_none() {
            rate_col = rows[1]
                .select(&cell_sel)
                .position(|c| looks_like_rate(&element_text(&c)));
        }
        if term_col.is_none() {
            term_col = rows[1]
                .select(&cell_sel)
                .position(|c| looks_like_term(&element_text(&c)));
        }
        let (Some(term_col), Some(rate_col)) = (term_col, rate_col) else {
            continue;
        };

        for row in &rows[1..] {
            let cells: Vec<String> = row.select(&cell_sel).map(|c| element_text(&c)).collect();
            if cells.len() <= term_col.max(rate_col) {
                continue;
            }
            let term = parse_term_days(&cells[term_col]);
            let rate = parse_rate_pct(&cells[rate_col]);
            if let (Some(term), Some(rate)) = (term, rate) {
                if !pairs.iter().any(|(t, r)| *t == term && *r == rate) {
                    pairs.push((term, rate));
                }
            }
        }
    }

    pairs
}

/// Scan the document text for one flat rate figure near a rate keyword.
///
/// For savings/fiduciary pages that quote a single number ("rentabilidad del
/// 9,25% E.A.") with no table. Returns the first percentage whose
/// surrounding text mentions rates.
pub fn extract_flat_rate(html: &str) -> Option<f64> {
    let document = Html::parse_document(html);
    let body_sel = Selector::parse("body").unwrap();
    let text = document
        .select(&body_sel)
        .next()
        .map(|b| element_text(&b))
        .unwrap_or_default();
    let lower = text.to_lowercase();

    for m in rate_regex().find_iter(&lower) {
        // Clamp the context window to char boundaries; the surrounding
        // Spanish copy is full of multi-byte characters.
        let mut start = m.start().saturating_sub(80);
        while !lower.is_char_boundary(start) {
            start -= 1;
        }
        let mut end = (m.end() + 80).min(lower.len());
        while !lower.is_char_boundary(end) {
            end += 1;
        }
        let window = &lower[start..end];
        if contains_any(window, &["e.a", "tasa", "rendimiento", "interés", "interes", "anual"]) {
            if let Some(rate) = parse_rate_pct(m.as_str()) {
                return Some(rate);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate_formats() {
        assert_eq!(parse_rate_pct("9,50 % E.A."), Some(9.5));
        assert_eq!(parse_rate_pct("10.25%"), Some(10.25));
        assert_eq!(parse_rate_pct("0.095"), Some(9.5));
        assert_eq!(parse_rate_pct("12"), Some(12.0));
        assert_eq!(parse_rate_pct("tasa"), None);
        assert_eq!(parse_rate_pct(""), None);
    }

    #[test]
    fn test_parse_term_formats() {
        assert_eq!(parse_term_days("90 días"), Some(90));
        assert_eq!(parse_term_days("90 dias"), Some(90));
        assert_eq!(parse_term_days("3 meses"), Some(90));
        assert_eq!(parse_term_days("1 año"), Some(365));
        assert_eq!(parse_term_days("12"), Some(360)); // ≤ 36 reads as months
        assert_eq!(parse_term_days("180"), Some(180));
        assert_eq!(parse_term_days("indefinido"), None);
    }

    #[test]
    fn test_extract_term_rates_with_headers() {
        let html = r#"
            <html><body>
            <h2>Tasas CDT</h2>
            <table>
              <tr><th>Plazo</th><th>Tasa E.A.</th></tr>
              <tr><td>30 días</td><td>9,50%</td></tr>
              <tr><td>60 días</td><td>9,75%</td></tr>
              <tr><td>90 días</td><td>10,00%</td></tr>
            </table>
            </body></html>"#;
        let pairs = extract_term_rates(html);
        assert_eq!(pairs, vec![(30, 9.5), (60, 9.75), (90, 10.0)]);
    }

    #[test]
    fn test_extract_term_rates_sniffs_columns_without_headers() {
        let html = r#"
            <table>
              <tr><td>Producto</td><td>Detalle</td><td>Valor</td></tr>
              <tr><td>CDT inversión</td><td>60 días</td><td>9,10% E.A.</td></tr>
              <tr><td>CDT inversión</td><td>90 días</td><td>9,60% E.A.</td></tr>
            </table>"#;
        let pairs = extract_term_rates(html);
        assert_eq!(pairs, vec![(60, 9.1), (90, 9.6)]);
    }

    #[test]
    fn test_extract_term_rates_ignores_unrelated_tables() {
        let html = r#"
            <table>
              <tr><th>Oficina</th><th>Horario</th></tr>
              <tr><td>Bogotá</td><td>8-17</td></tr>
            </table>"#;
        assert!(extract_term_rates(html).is_empty());
    }

    #[test]
    fn test_extract_term_rates_dedupes() {
        let html = r#"
            <table>
              <tr><th>Plazo</th><th>Tasa</th></tr>
              <tr><td>30 días</td><td>9,5%</td></tr>
              <tr><td>30 días</td><td>9,5%</td></tr>
            </table>"#;
        assert_eq!(extract_term_rates(html), vec![(30, 9.5)]);
    }

    #[test]
    fn test_extract_flat_rate() {
        let html = r#"
            <html><body>
              <p>Tu plata rinde al 9,25% E.A. en las Cajitas, disponible siempre.</p>
            </body></html>"#;
        assert_eq!(extract_flat_rate(html), Some(9.25));
    }

    #[test]
    fn test_extract_flat_rate_ignores_unrelated_percentages() {
        let html = r#"
            <html><body>
              <p>El 87% de nuestros clientes nos recomienda.</p>
            </body></html>"#;
        assert_eq!(extract_flat_rate(html), None);
    }
}
