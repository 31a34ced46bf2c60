use whatlang::{Lang, detect};

const MIN_CONFIDENCE: f64 = 0.25;
const MIN_TEXT_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedLanguage {
    /// ISO 639-1 where one exists, otherwise whatlang's ISO 639-3 code.
    pub code: &'static str,
    /// English name, used in generation prompts.
    pub name: &'static str,
}

pub fn detect_language(text: &str) -> Option<DetectedLanguage> {
    if text.trim().chars().count() < MIN_TEXT_CHARS {
        return None;
    }

    let info = detect(text)?;
    if info.confidence() < MIN_CONFIDENCE {
        return None;
    }

    let lang = info.lang();
    Some(DetectedLanguage {
        code: iso_639_1(lang).unwrap_or_else(|| lang.code()),
        name: lang.eng_name(),
    })
}

fn iso_639_1(lang: Lang) -> Option<&'static str> {
    let code = match lang {
        Lang::Eng => "en",
        Lang::Rus => "ru",
        Lang::Cmn => "zh",
        Lang::Spa => "es",
        Lang::Fra => "fr",
        Lang::Deu => "de",
        Lang::Jpn => "ja",
        Lang::Kor => "ko",
        Lang::Por => "pt",
        Lang::Ita => "it",
        Lang::Nld => "nl",
        Lang::Pol => "pl",
        Lang::Tur => "tr",
        Lang::Swe => "sv",
        Lang::Dan => "da",
        Lang::Fin => "fi",
        Lang::Heb => "he",
        Lang::Ara => "ar",
        Lang::Hin => "hi",
        Lang::Tha => "th",
        Lang::Vie => "vi",
        Lang::Ukr => "uk",
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_english() {
        let text = "This is a test of the English language detection system. It should work well.";
        let detected = detect_language(text).unwrap();
        assert_eq!(detected.code, "en");
        assert_eq!(detected.name, "English");
    }

    #[test]
    fn test_detect_spanish() {
        let text = "Esto es una prueba del sistema de detección de idiomas en español. Debería funcionar bien.";
        assert_eq!(detect_language(text).map(|l| l.code), Some("es"));
    }

    #[test]
    fn test_detect_article_paragraphs() {
        let english = "The city council met on Tuesday evening to discuss the new budget. \
            Several residents asked why the park renovation had been delayed again. \
            The mayor promised that work would begin before the end of the summer.";
        let german = "Der Stadtrat hat am Dienstagabend über den neuen Haushalt beraten. \
            Mehrere Anwohner wollten wissen, warum die Sanierung des Parks erneut verschoben wurde. \
            Die Bürgermeisterin versprach, dass die Arbeiten noch vor Ende des Sommers beginnen.";
        let french = "Le conseil municipal s'est réuni mardi soir pour discuter du nouveau budget. \
            Plusieurs habitants ont demandé pourquoi la rénovation du parc avait encore été retardée. \
            Le maire a promis que les travaux commenceraient avant la fin de l'été.";

        assert_eq!(detect_language(english).map(|l| l.code), Some("en"));
        let detected = detect_language(german).unwrap();
        assert_eq!(detected.code, "de");
        assert_eq!(detected.name, "German");
        assert_eq!(detect_language(french).map(|l| l.code), Some("fr"));
    }

    #[test]
    fn test_short_text_returns_none() {
        assert_eq!(detect_language("Short"), None);
    }

    #[test]
    fn test_low_confidence_returns_none() {
        let text =
            "1 2 3 4 5 6 7 8 9 0 ! @ # $ % ^ & * ( ) - = + [ ] { } | \\ : ; \" ' < > , . ? /";
        assert_eq!(detect_language(text), None);
    }
}
