//! Cleanup pass for voice-note transcripts: drop hesitation fillers and turn
//! spelled-out numbers into digits so the text parser sees `50000`, not
//! `fifty thousand`.

const FILLERS: &[&str] = &[
    "um", "umm", "uh", "uhh", "uhm", "er", "erm", "hmm", "ehm", "ah", "eh", "basically", "actually",
];

const FILLER_PHRASES: &[&[&str]] = &[&["you", "know"], &["i", "mean"], &["sort", "of"]];

const ONES: &[(&str, u64)] = &[
    ("zero", 0),
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
    ("thirteen", 13),
    ("fourteen", 14),
    ("fifteen", 15),
    ("sixteen", 16),
    ("seventeen", 17),
    ("eighteen", 18),
    ("nineteen", 19),
];

const TENS: &[(&str, u64)] = &[
    ("twenty", 20),
    ("thirty", 30),
    ("forty", 40),
    ("fifty", 50),
    ("sixty", 60),
    ("seventy", 70),
    ("eighty", 80),
    ("ninety", 90),
];

const SCALES: &[(&str, u64)] = &[
    ("thousand", 1_000),
    ("million", 1_000_000),
    ("billion", 1_000_000_000),
];

/// Split a word into its lowercase core and trailing punctuation.
fn split_punct(word: &str) -> (String, &str) {
    let core = word.trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?'));
    (core.to_lowercase(), &word[core.len()..])
}

fn small_value(w: &str) -> Option<u64> {
    ONES.iter()
        .chain(TENS.iter())
        .find(|(name, _)| *name == w)
        .map(|(_, v)| *v)
}

fn scale_value(w: &str) -> Option<u64> {
    SCALES.iter().find(|(name, _)| *name == w).map(|(_, v)| *v)
}

fn is_number_word(w: &str) -> bool {
    small_value(w).is_some() || w == "hundred" || scale_value(w).is_some()
}

/// Accumulates one spoken number: `two hundred and fifty thousand`.
#[derive(Default)]
struct Spoken {
    total: u64,
    current: u64,
    seen: bool,
}

impl Spoken {
    fn push(&mut self, w: &str) -> bool {
        if let Some(v) = small_value(w) {
            self.current = self.current.saturating_add(v);
        } else if w == "hundred" {
            self.current = self.current.max(1).saturating_mul(100);
        } else if let Some(scale) = scale_value(w) {
            self.total = self
                .total
                .saturating_add(self.current.max(1).saturating_mul(scale));
            self.current = 0;
        } else if let Ok(n) = w.parse::<u64>() {
            if self.seen {
                return false;
            }
            self.current = n;
        } else {
            return false;
        }
        self.seen = true;
        true
    }

    fn value(&self) -> u64 {
        self.total.saturating_add(self.current)
    }
}

fn remove_fillers(words: Vec<&str>) -> Vec<&str> {
    let mut out = Vec::with_capacity(words.len());
    let mut i = 0;
    'outer: while i < words.len() {
        let (core, _) = split_punct(words[i]);
        if FILLERS.contains(&core.as_str()) {
            i += 1;
            continue;
        }
        for phrase in FILLER_PHRASES {
            if i + phrase.len() <= words.len()
                && phrase
                    .iter()
                    .enumerate()
                    .all(|(k, p)| split_punct(words[i + k]).0 == *p)
            {
                i += phrase.len();
                continue 'outer;
            }
        }
        out.push(words[i]);
        i += 1;
    }
    out
}

/// Convert runs of number words to digits. A bare digit run followed by a
/// scale word (`50 thousand`) is compounded too.
pub fn words_to_digits(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    convert_numbers(&words).join(" ")
}

fn convert_numbers(words: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(words.len());
    let mut i = 0;
    while i < words.len() {
        let (core, _) = split_punct(words[i]);
        let starts_number = is_number_word(&core)
            || (core == "a"
                && words
                    .get(i + 1)
                    .map(|w| {
                        let (next, _) = split_punct(w);
                        next == "hundred" || scale_value(&next).is_some()
                    })
                    .unwrap_or(false))
            || (core.parse::<u64>().is_ok()
                && words
                    .get(i + 1)
                    .map(|w| scale_value(&split_punct(w).0).is_some() || split_punct(w).0 == "hundred")
                    .unwrap_or(false));
        if !starts_number {
            out.push(words[i].to_string());
            i += 1;
            continue;
        }

        let mut spoken = Spoken::default();
        let mut j = i;
        let mut trailing = "";
        while j < words.len() {
            let (w, punct) = split_punct(words[j]);
            let accepted = if w == "a" && j == i {
                true
            } else if w == "and" && spoken.seen {
                // only a connector when another number word follows
                words
                    .get(j + 1)
                    .map(|n| is_number_word(&split_punct(n).0))
                    .unwrap_or(false)
            } else {
                spoken.push(&w)
            };
            if !accepted {
                break;
            }
            trailing = punct;
            j += 1;
            if !punct.is_empty() {
                break;
            }
        }

        if spoken.seen {
            out.push(format!("{}{}", spoken.value(), trailing));
            i = j;
        } else {
            out.push(words[i].to_string());
            i += 1;
        }
    }
    out
}

/// Full transcript cleanup: fillers first, then number words.
pub fn clean_transcript(text: &str) -> String {
    let mut lines = Vec::new();
    for line in text.lines() {
        let words = remove_fillers(line.split_whitespace().collect());
        lines.push(convert_numbers(&words).join(" "));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compounds_tens_hundreds_thousands() {
        assert_eq!(words_to_digits("fifty thousand"), "50000");
        assert_eq!(words_to_digits("two hundred and fifty"), "250");
        assert_eq!(
            words_to_digits("one million two hundred thousand"),
            "1200000"
        );
        assert_eq!(words_to_digits("twenty five"), "25");
        assert_eq!(words_to_digits("a thousand"), "1000");
        assert_eq!(words_to_digits("50 thousand naira"), "50000 naira");
    }

    #[test]
    fn keeps_trailing_punctuation() {
        assert_eq!(words_to_digits("five wigs, ten shoes."), "5 wigs, 10 shoes.");
    }

    #[test]
    fn does_not_swallow_plain_words() {
        assert_eq!(words_to_digits("a wig and a shoe"), "a wig and a shoe");
        assert_eq!(words_to_digits("one and only"), "1 and only");
    }

    #[test]
    fn strips_fillers() {
        assert_eq!(
            clean_transcript("um invoice uh Joy, you know, fifty thousand for wig"),
            "invoice Joy, 50000 for wig"
        );
    }
}
