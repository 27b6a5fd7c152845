use crate::book::{Book, BookFormat, Dimensions, InventoryItem, InventoryStatus, Metrics};
use crate::words::{
    pick, CITIES, COMPANY_SUFFIXES, DOMAINS, FIRST_NAMES, GENRES, LANGUAGES, LAST_NAMES, STREETS,
    WORDS,
};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

/// Produces synthetic documents for a given id.
pub trait RecordGenerator: Send + Sync {
    fn random_document(&self, id: u64, rng: &mut dyn RngCore) -> Book;
}

/// Generates books from the fixed vocabularies in [`crate::words`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeBookGenerator;

impl RecordGenerator for FakeBookGenerator {
    fn random_document(&self, id: u64, rng: &mut dyn RngCore) -> Book {
        let editions = sample(LANGUAGES, rng.gen_range(1..=5), rng);
        let genres = sample(GENRES, rng.gen_range(1..=6), rng);
        let inventory = (0..rng.gen_range(1..=10))
            .map(|n| InventoryItem {
                status: *InventoryStatus::ALL
                    .choose(rng)
                    .unwrap_or(&InventoryStatus::Available),
                stock_id: format!("{id}_{n}"),
            })
            .collect();

        Book {
            id: id.to_string(),
            author: person_name(rng),
            title: words(rng.gen_range(1..=5), rng),
            description: paragraph(rng),
            editions,
            genres,
            inventory,
            metrics: Metrics {
                rating_votes: rng.gen_range(1..=1000),
                score: round2(rng.gen_range(1.0..=5.0)),
            },
            pages: rng.gen_range(50..=1500),
            url: format!("https://{}/{}", pick(DOMAINS, rng), pick(WORDS, rng)),
            year_published: rng.gen_range(1900..=2023),
            format: *BookFormat::ALL.choose(rng).unwrap_or(&BookFormat::Paperback),
            is_available: rng.gen_bool(0.5),
            price: round2(rng.gen_range(5.0..=100.0)),
            isbn: isbn13(rng),
            address: format!(
                "{} {}, {}",
                rng.gen_range(1..=9999),
                pick(STREETS, rng),
                pick(CITIES, rng)
            ),
            geo: format!(
                "{:.6},{:.6}",
                rng.gen_range(-180.0..=180.0_f64),
                rng.gen_range(-85.0..=85.0_f64)
            ),
            weight_grams: rng.gen_range(-100..=2000),
            dimensions: Dimensions {
                width_cm: round2(rng.gen_range(10.0..=30.0)),
                height_cm: round2(rng.gen_range(20.0..=40.0)),
                depth_cm: round2(rng.gen_range(1.0..=10.0)),
            },
            edition_number: rng.gen_range(1..=10),
            chapter_count: rng.gen_range(5..=50),
            review_count: rng.gen_range(0..=5000),
            citation_count: rng.gen_range(0..=1000),
            timestamp: rng.gen_range(0..=1_700_000_000),
            publishing_delay: rng.gen_range(-356..=1000),
            word_count: rng.gen_range(10_000..=150_000),
            reading_time_minutes: rng.gen_range(30..=1200),
            global_sales: rng.gen_range(1000..=1_000_000),
            translations_count: rng.gen_range(1..=50),
            publisher: format!("{} {}", pick(LAST_NAMES, rng), pick(COMPANY_SUFFIXES, rng)),
            book_series: words(rng.gen_range(1..=3), rng),
            main_character: pick(FIRST_NAMES, rng).to_owned(),
            location: pick(CITIES, rng).to_owned(),
            author_age_at_publication: rng.gen_range(20..=80),
            shelf_code: rng.gen_range(-10_000..=10_000),
        }
    }
}

fn sample(list: &[&str], amount: usize, rng: &mut dyn RngCore) -> Vec<String> {
    list.choose_multiple(rng, amount)
        .map(|s| (*s).to_owned())
        .collect()
}

fn person_name(rng: &mut dyn RngCore) -> String {
    format!("{} {}", pick(FIRST_NAMES, rng), pick(LAST_NAMES, rng))
}

fn words(n: usize, rng: &mut dyn RngCore) -> String {
    (0..n).map(|_| pick(WORDS, rng)).collect::<Vec<_>>().join(" ")
}

fn paragraph(rng: &mut dyn RngCore) -> String {
    (0..rng.gen_range(3..=8))
        .map(|_| {
            let mut sentence = words(rng.gen_range(6..=14), rng);
            if let Some(first) = sentence.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            sentence.push('.');
            sentence
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// ISBN-13 with the 978 prefix and a valid check digit.
fn isbn13(rng: &mut dyn RngCore) -> String {
    let mut digits: Vec<u32> = vec![9, 7, 8];
    digits.extend((0..9).map(|_| rng.gen_range(0..10)));
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { *d } else { d * 3 })
        .sum();
    digits.push((10 - sum % 10) % 10);
    digits.iter().map(u32::to_string).collect()
}
