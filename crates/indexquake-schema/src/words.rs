//! Fixed vocabularies for synthetic records and random query terms.

use rand::seq::SliceRandom;
use rand::RngCore;

pub const WORDS: &[&str] = &[
    "amber", "anchor", "autumn", "balance", "beacon", "bitter", "bridge", "candle", "canyon",
    "carbon", "cedar", "chapter", "circle", "cloud", "copper", "coral", "crimson", "current",
    "dawn", "delta", "desert", "drift", "echo", "ember", "engine", "falcon", "feather", "field",
    "forest", "fossil", "garden", "glacier", "granite", "green", "harbor", "hollow", "horizon",
    "island", "ivory", "jungle", "lantern", "letter", "linen", "lunar", "marble", "meadow",
    "mirror", "morning", "mountain", "nectar", "north", "ocean", "orbit", "orchard", "paper",
    "pepper", "pilot", "planet", "prairie", "quartz", "quiet", "raven", "ribbon", "river",
    "saddle", "salt", "shadow", "silver", "sketch", "smoke", "spiral", "spring", "stone",
    "summer", "thunder", "timber", "tower", "valley", "velvet", "violet", "voyage", "walnut",
    "willow", "window", "winter", "wonder", "yellow", "zephyr",
];

pub const FIRST_NAMES: &[&str] = &[
    "Alice", "Bruno", "Carmen", "Dmitri", "Elena", "Farid", "Greta", "Hiro", "Ines", "Jonas",
    "Kavya", "Liam", "Mira", "Nadia", "Omar", "Petra", "Quentin", "Rosa", "Soren", "Talia",
    "Umar", "Vera", "Wendell", "Ximena", "Yusuf", "Zora",
];

pub const LAST_NAMES: &[&str] = &[
    "Abbott", "Bianchi", "Castillo", "Dubois", "Eriksen", "Fischer", "Garcia", "Haddad",
    "Ibrahim", "Jensen", "Kowalski", "Larsen", "Moreau", "Novak", "Okafor", "Petrov", "Quinn",
    "Rossi", "Schmidt", "Tanaka", "Ueda", "Varga", "Weber", "Xu", "Yilmaz", "Zimmer",
];

pub const CITIES: &[&str] = &[
    "Lisbon", "Krakow", "Osaka", "Nairobi", "Quito", "Tallinn", "Porto", "Valencia", "Leeds",
    "Bergen", "Hobart", "Tucson", "Halifax", "Ghent", "Graz", "Cusco", "Sapporo", "Dakar",
];

pub const COMPANY_SUFFIXES: &[&str] = &["Press", "Books", "House", "Publishing", "Editions", "Media"];

pub const STREETS: &[&str] = &[
    "Maple Street", "Harbor Road", "Mill Lane", "Station Avenue", "Orchard Way", "Quarry Hill",
    "Bridge End", "Church Walk", "Kings Parade", "Canal Row",
];

pub const LANGUAGES: &[&str] = &[
    "english", "spanish", "french", "german", "italian", "chinese", "japanese", "russian",
    "arabic", "portuguese", "korean", "dutch", "swedish", "norwegian", "danish", "finnish",
    "polish", "turkish", "hindi", "urdu", "greek", "hebrew", "thai", "vietnamese", "indonesian",
    "hungarian", "czech", "slovak", "romanian", "bulgarian", "ukrainian", "serbian", "croatian",
    "slovenian", "latvian",
];

pub const GENRES: &[&str] = &[
    "comics (superheroes)", "fiction", "non-fiction", "science fiction", "fantasy", "mystery",
    "romance", "history", "horror", "biography", "thriller", "self-help", "poetry", "cookbooks",
    "memoir", "young adult", "children's literature", "drama", "travel", "science", "art",
    "philosophy", "psychology", "religion", "true crime", "graphic novel", "adventure",
    "political", "health", "humor",
];

pub const DOMAINS: &[&str] = &["example.com", "example.org", "example.net", "books.test"];

/// Pick one entry from a non-empty vocabulary.
pub(crate) fn pick<'a>(list: &[&'a str], rng: &mut dyn RngCore) -> &'a str {
    list.choose(rng).copied().unwrap_or("")
}

/// A random lowercase word, used both for titles and as a full-text query term.
pub fn random_word(rng: &mut dyn RngCore) -> &'static str {
    pick(WORDS, rng)
}
