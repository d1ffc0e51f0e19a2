//! Catalog search scoring.
//!
//! Multi-keyword matching: a product matches when any keyword hits (OR),
//! and products hit by every keyword (AND) get a coverage bonus. Title hits
//! weigh more than description/category hits. Ties sort by title.

use std::cmp::Ordering;

use mercabot_core::catalog::Product;

use crate::language;

const TITLE_WEIGHT: f64 = 3.0;
const BODY_WEIGHT: f64 = 1.0;
const COVERAGE_BONUS: f64 = 2.0;

#[derive(Clone, Debug)]
pub struct SearchHit {
    pub product: Product,
    pub score: f64,
}

/// Lowercase and strip Spanish accents so "camión" matches "camion".
pub fn fold(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            other => other,
        })
        .collect()
}

/// Crude plural stripping so "zapatillas" also finds "zapatilla".
fn stem(word: &str) -> &str {
    if word.chars().count() > 4 {
        if let Some(s) = word.strip_suffix("es").filter(|s| s.chars().count() > 3) {
            return s;
        }
        if let Some(s) = word.strip_suffix('s') {
            return s;
        }
    }
    word
}

/// Search keywords of `query`: folded, stop-words removed, deduplicated.
/// A query made only of stop-words falls back to all of its words.
pub fn keywords(query: &str, extra_stop: &[String]) -> Vec<String> {
    let all = language::words(&fold(query));
    let mut kept: Vec<String> = all
        .iter()
        .filter(|w| !language::is_stop_word(w, extra_stop))
        .cloned()
        .collect();
    if kept.is_empty() {
        kept = all;
    }
    let mut seen = Vec::with_capacity(kept.len());
    for w in kept {
        if !seen.contains(&w) {
            seen.push(w);
        }
    }
    seen
}

/// Score every product against `query`; non-matching products are dropped.
pub fn rank(products: &[Product], query: &str, extra_stop: &[String]) -> Vec<SearchHit> {
    let keywords = keywords(query, extra_stop);
    if keywords.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<SearchHit> = products
        .iter()
        .filter_map(|p| {
            let title = fold(&p.title);
            let body = fold(&format!("{} {}", p.description, p.category));
            let mut score = 0.0;
            let mut matched = 0;
            for kw in &keywords {
                let needle = stem(kw);
                if title.contains(needle) {
                    score += TITLE_WEIGHT;
                    matched += 1;
                } else if body.contains(needle) {
                    score += BODY_WEIGHT;
                    matched += 1;
                }
            }
            if matched == 0 {
                return None;
            }
            if keywords.len() > 1 && matched == keywords.len() {
                score += COVERAGE_BONUS;
            }
            Some(SearchHit {
                product: p.clone(),
                score,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.product.title.cmp(&b.product.title))
    });
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use mercabot_core::catalog::Price;

    fn product(title: &str, description: &str, category: &str) -> Product {
        Product {
            id: fold(title).replace(' ', "-"),
            slug: fold(title).replace(' ', "-"),
            title: title.into(),
            description: description.into(),
            category: category.into(),
            price: Price {
                regular: 50.0,
                sale: None,
            },
            image: None,
            available: true,
            stock: None,
        }
    }

    fn catalog() -> Vec<Product> {
        vec![
            product("Zapatilla Runner", "Ideal para correr, suela deportiva", "Calzado"),
            product("Zapatilla Urbana", "Para el día a día", "Calzado"),
            product("Camiseta Dry", "Tela deportiva transpirable", "Ropa"),
            product("Gorra Trucker", "Ajustable", "Accesorios"),
        ]
    }

    #[test]
    fn test_keywords_drop_stop_words() {
        assert_eq!(keywords("busco zapatillas deportivas", &[]), vec!["zapatillas", "deportivas"]);
        assert_eq!(keywords("Camión", &[]), vec!["camion"]);
        assert_eq!(keywords("busco", &[]), vec!["busco"]);
    }

    #[test]
    fn test_body_hits_tie_break_by_title() {
        let hits = rank(&catalog(), "deportiva", &[]);
        let titles: Vec<&str> = hits.iter().map(|h| h.product.title.as_str()).collect();
        // Both hit in the body only; alphabetical tie-break.
        assert_eq!(titles, vec!["Camiseta Dry", "Zapatilla Runner"]);
    }

    #[test]
    fn test_full_coverage_bonus_ranks_first() {
        let hits = rank(&catalog(), "zapatillas deportivas", &[]);
        assert_eq!(hits[0].product.title, "Zapatilla Runner");
        assert_eq!(hits[0].score, TITLE_WEIGHT + BODY_WEIGHT + COVERAGE_BONUS);
        assert_eq!(hits[1].product.title, "Zapatilla Urbana");
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_no_match_is_empty() {
        assert!(rank(&catalog(), "mochila", &[]).is_empty());
        assert!(rank(&[], "zapatillas", &[]).is_empty());
    }
}
