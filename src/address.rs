//! Deterministic synthetic recipient addresses for reproducible benchmark runs.
//!
//! Every address draws, in this order, a first name, a last name, a street, a
//! house number in `[1, 200]` and a `(postal code, city)` pair from the fixed
//! pools below. The draws come from a `ChaCha8Rng` seeded with `seed_from_u64`,
//! so the same seed yields the same sequence on every platform.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const FIRST_NAMES: &[&str] = &[
    "Hans", "Peter", "Klaus", "Wolfgang", "Jürgen", "Günter", "Dieter", "Heinz", "Werner",
    "Gerhard", "Maria", "Elisabeth", "Monika", "Ursula", "Helga", "Renate", "Ingrid", "Karin",
    "Sabine", "Andrea", "Thomas", "Michael", "Andreas", "Stefan", "Christian", "Markus", "Frank",
    "Martin", "Bernd", "Uwe",
];

const LAST_NAMES: &[&str] = &[
    "Müller", "Schmidt", "Schneider", "Fischer", "Weber", "Meyer", "Wagner", "Becker", "Schulz",
    "Hoffmann", "Schäfer", "Koch", "Bauer", "Richter", "Klein", "Wolf", "Schröder", "Neumann",
    "Schwarz", "Zimmermann", "Braun", "Krüger", "Hofmann", "Hartmann", "Lange", "Schmitt",
    "Werner", "Schmitz", "Krause", "Meier",
];

const STREETS: &[&str] = &[
    "Hauptstraße", "Bahnhofstraße", "Schulstraße", "Gartenstraße", "Berliner Straße",
    "Dorfstraße", "Birkenweg", "Lindenstraße", "Kirchstraße", "Waldstraße", "Ringstraße",
    "Bergstraße", "Schillerstraße", "Goethestraße", "Mozartstraße", "Rosenweg", "Feldstraße",
    "Parkstraße", "Industriestraße", "Friedhofstraße", "Jahnstraße", "Lessingstraße",
    "Beethovenstraße", "Uhlandstraße", "Kantstraße", "Am Markt", "Wiesenstraße", "Mühlenweg",
    "Erlenweg", "Ahornweg",
];

const CITIES: &[(&str, &str)] = &[
    ("10115", "Berlin"),
    ("20095", "Hamburg"),
    ("80331", "München"),
    ("50667", "Köln"),
    ("60311", "Frankfurt am Main"),
    ("70173", "Stuttgart"),
    ("40213", "Düsseldorf"),
    ("44135", "Dortmund"),
    ("45127", "Essen"),
    ("04109", "Leipzig"),
    ("28195", "Bremen"),
    ("01067", "Dresden"),
    ("30159", "Hannover"),
    ("90402", "Nürnberg"),
    ("47051", "Duisburg"),
    ("44623", "Herne"),
    ("42103", "Wuppertal"),
    ("33602", "Bielefeld"),
    ("53111", "Bonn"),
    ("48143", "Münster"),
];

/// Highest house number drawn (inclusive).
const MAX_HOUSE_NUMBER: u32 = 200;

/// A recipient identity as printed in the letter's address window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub recipient_name: String,
    pub recipient_street: String,
    /// Postal code followed by the city name.
    pub recipient_city: String,
}

impl Address {
    pub fn new(
        name: impl Into<String>,
        street: impl Into<String>,
        city: impl Into<String>,
    ) -> Self {
        Self {
            recipient_name: name.into(),
            recipient_street: street.into(),
            recipient_city: city.into(),
        }
    }
}

/// Endless, seeded stream of synthetic addresses.
#[derive(Debug, Clone)]
pub struct AddressSource {
    rng: ChaCha8Rng,
}

impl AddressSource {
    pub fn new(seed: u64) -> Self {
        debug_assert!(
            !FIRST_NAMES.is_empty()
                && !LAST_NAMES.is_empty()
                && !STREETS.is_empty()
                && !CITIES.is_empty(),
            "address pools must not be empty"
        );
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn pick<'a, T>(&mut self, pool: &'a [T]) -> &'a T {
        &pool[self.rng.random_range(0..pool.len())]
    }

    /// Draw the next address.
    pub fn next_address(&mut self) -> Address {
        let first = *self.pick(FIRST_NAMES);
        let last = *self.pick(LAST_NAMES);
        let street = *self.pick(STREETS);
        let house_number = self.rng.random_range(1..=MAX_HOUSE_NUMBER);
        let (postal_code, city) = *self.pick(CITIES);

        Address {
            recipient_name: format!("{first} {last}"),
            recipient_street: format!("{street} {house_number}"),
            recipient_city: format!("{postal_code} {city}"),
        }
    }
}

impl Iterator for AddressSource {
    type Item = Address;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_address())
    }
}

/// Generate `count` addresses for `seed`.
pub fn generate(seed: u64, count: usize) -> Vec<Address> {
    AddressSource::new(seed).take(count).collect()
}

/// The address at position `index` of the sequence for `seed`.
pub fn at(seed: u64, index: usize) -> Address {
    let mut source = AddressSource::new(seed);
    for _ in 0..index {
        source.next_address();
    }
    source.next_address()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pools_are_populated() {
        assert_eq!(FIRST_NAMES.len(), 30);
        assert_eq!(LAST_NAMES.len(), 30);
        assert_eq!(STREETS.len(), 30);
        assert_eq!(CITIES.len(), 20);
    }

    #[test]
    fn test_generate_deterministic() {
        let first = generate(42, 500);
        let second = generate(42, 500);
        assert_eq!(first, second);
    }

    #[test]
    fn test_seed_42_first_address_is_stable() {
        let a = AddressSource::new(42).next_address();
        let b = generate(42, 1).remove(0);
        assert_eq!(a, b);
        assert!(!a.recipient_name.is_empty());
    }

    #[test]
    fn test_different_seeds_diverge() {
        assert_ne!(generate(1, 50), generate(2, 50));
    }

    #[test]
    fn test_fields_come_from_pools() {
        for address in generate(7, 1_000) {
            let (first, last) = address
                .recipient_name
                .split_once(' ')
                .expect("name has two parts");
            assert!(FIRST_NAMES.contains(&first));
            assert!(LAST_NAMES.contains(&last));

            let (street, number) = address
                .recipient_street
                .rsplit_once(' ')
                .expect("street has a house number");
            assert!(STREETS.contains(&street));
            let number: u32 = number.parse().unwrap();
            assert!((1..=MAX_HOUSE_NUMBER).contains(&number));

            let (code, city) = address.recipient_city.split_once(' ').unwrap();
            assert!(CITIES.contains(&(code, city)));
        }
    }

    #[test]
    fn test_lookup_by_position_matches_sequence() {
        let sequence = generate(42, 100);
        assert_eq!(at(42, 0), sequence[0]);
        assert_eq!(at(42, 37), sequence[37]);
        assert_eq!(at(42, 99), sequence[99]);
    }

    #[test]
    fn test_iterator_matches_next_address() {
        let mut manual = AddressSource::new(99);
        let manual: Vec<Address> = (0..10).map(|_| manual.next_address()).collect();
        let iterated: Vec<Address> = AddressSource::new(99).take(10).collect();
        assert_eq!(manual, iterated);
    }
}
