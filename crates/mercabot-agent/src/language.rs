//! Language detection and stop-word lists (Spanish, English).

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Language {
    Es,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Es => "es",
            Language::En => "en",
        }
    }

    /// `"es"`/`"en"` (case-insensitive, region suffix ignored).
    pub fn parse(code: &str) -> Option<Language> {
        let base = code.split(['-', '_']).next().unwrap_or_default().to_lowercase();
        match base.as_str() {
            "es" => Some(Language::Es),
            "en" => Some(Language::En),
            _ => None,
        }
    }

    pub fn stop_words(&self) -> &'static [&'static str] {
        match self {
            Language::Es => ES_STOP_WORDS,
            Language::En => EN_STOP_WORDS,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const ES_MARKERS: &[&str] = &[
    "el", "la", "los", "las", "de", "del", "que", "y", "en", "un", "una", "por", "para", "con",
    "es", "son", "hola", "busco", "quiero", "tienen", "cuanto", "cuánto", "precio", "gracias",
    "sí", "envío", "envio", "agrégalo", "agregalo", "cómo", "como", "qué", "dónde", "donde",
    "mi", "me", "necesito", "buenas", "buenos",
];

const EN_MARKERS: &[&str] = &[
    "the", "a", "an", "is", "are", "and", "of", "to", "for", "with", "what", "how", "why", "do",
    "does", "you", "i", "my", "have", "hello", "hi", "hey", "looking", "want", "please",
    "thanks", "shipping", "much", "need", "can", "where", "it",
];

const ES_STOP_WORDS: &[&str] = &[
    "el", "la", "los", "las", "un", "una", "unos", "unas", "de", "del", "al", "y", "o", "en",
    "con", "por", "para", "que", "me", "mi", "mis", "se", "lo", "le", "es", "son", "hay",
    "busco", "buscar", "quiero", "necesito", "tienen", "tienes", "tiene", "algun", "algún",
    "alguna", "algunos", "algunas", "muestrame", "muéstrame", "ver", "dame", "hola", "favor",
    "cuanto", "cuánto", "cuesta", "cuestan", "precio", "sobre", "este", "esta", "ese", "esa",
    "eso", "esto", "producto", "productos", "sí", "si", "agrégalo", "agregalo", "agrega",
    "agregar", "añade", "añadir", "carrito", "comprar", "quisiera", "cual", "cuál", "qué",
    "como", "cómo", "detalles", "info", "información", "vale", "valen",
];

const EN_STOP_WORDS: &[&str] = &[
    "the", "a", "an", "of", "and", "or", "in", "on", "with", "for", "to", "i", "me", "my", "is",
    "am", "are", "do", "does", "you", "have", "has", "any", "some", "looking", "look", "want", "need",
    "show", "find", "search", "please", "hi", "hello", "price", "cost", "costs", "how", "much",
    "what", "this", "that", "it", "product", "products", "add", "cart", "buy", "details",
    "about", "info",
];

/// Lowercased word tokens, punctuation stripped.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Score Spanish markers against English function words; ties go to Spanish.
pub fn detect_language(text: &str) -> Language {
    let lower = text.to_lowercase();
    let mut es = lower
        .chars()
        .filter(|c| matches!(c, 'á' | 'é' | 'í' | 'ó' | 'ú' | 'ñ' | '¿' | '¡'))
        .count();
    let mut en = 0;
    for w in words(&lower) {
        if ES_MARKERS.contains(&w.as_str()) {
            es += 1;
        }
        if EN_MARKERS.contains(&w.as_str()) {
            en += 1;
        }
    }
    if en > es {
        Language::En
    } else {
        Language::Es
    }
}

/// Whether `word` is a stop-word in either language or in `extra`.
pub fn is_stop_word(word: &str, extra: &[String]) -> bool {
    let w = word.trim().to_lowercase();
    ES_STOP_WORDS.contains(&w.as_str())
        || EN_STOP_WORDS.contains(&w.as_str())
        || extra.iter().any(|e| e.eq_ignore_ascii_case(&w))
}

/// Words of `text` that are not stop-words for `lang` (or `extra`).
pub fn content_words(text: &str, lang: Language, extra: &[String]) -> Vec<String> {
    words(text)
        .into_iter()
        .filter(|w| !lang.stop_words().contains(&w.as_str()))
        .filter(|w| !extra.iter().any(|e| e.eq_ignore_ascii_case(w)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_spanish() {
        assert_eq!(detect_language("hola"), Language::Es);
        assert_eq!(detect_language("busco zapatillas deportivas"), Language::Es);
        assert_eq!(detect_language("¿Cuánto cuesta el envío?"), Language::Es);
    }

    #[test]
    fn test_detect_english() {
        assert_eq!(detect_language("how much is the shipping?"), Language::En);
        assert_eq!(detect_language("I am looking for running shoes"), Language::En);
    }

    #[test]
    fn test_tie_goes_to_spanish() {
        assert_eq!(detect_language("zapatillas"), Language::Es);
        assert_eq!(detect_language(""), Language::Es);
    }

    #[test]
    fn test_parse_code() {
        assert_eq!(Language::parse("es-AR"), Some(Language::Es));
        assert_eq!(Language::parse("EN"), Some(Language::En));
        assert_eq!(Language::parse("pt"), None);
    }

    #[test]
    fn test_content_words_strip_stop_words() {
        let extra = vec!["tienda".to_string()];
        assert_eq!(
            content_words("busco zapatillas deportivas en la tienda", Language::Es, &extra),
            vec!["zapatillas", "deportivas"]
        );
        assert!(is_stop_word("El", &[]));
        assert!(is_stop_word("tienda", &extra));
        assert!(!is_stop_word("zapatillas", &extra));
    }
}
