//! Startup data: three reference records plus a bulk of synthetic ones.
//!
//! Seeding is an explicit bootstrap step. It runs once, before the listener
//! is bound, inserting record by record. It is not atomic: a crash part way
//! leaves the records inserted so far, each of them complete.

use anyhow::Context;
use chrono::{Days, Local, Months, NaiveDate};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::SeedConfig;
use crate::error::Result;
use crate::person::{Criteria, EyeColor, NewPerson, PersonStore};

const FIRST_NAMES: &[&str] = &[
    "Aiko", "Amara", "Bruno", "Carmen", "Dmitri", "Elena", "Farid", "Fatima", "Felix", "Greta",
    "Hamid", "Ingrid", "Jonas", "Kim", "Leila", "Mateo", "Nadia", "Oskar", "Priya", "Quentin",
    "Rosa", "Salvador", "Tomas", "Uma", "Viktor", "Wen", "Ximena", "Yusuf", "Zofia", "Florence",
];

const LAST_NAMES: &[&str] = &[
    "Abara", "Becker", "Castillo", "Dubois", "Eriksen", "Fischer", "Fontaine", "Garcia", "Hu",
    "Ivanova", "Jensen", "Kowalski", "Lindqvist", "Moreau", "Nakamura", "Okafor", "Petrov",
    "Quinn", "Rossi", "Santos", "Tanaka", "Ulyanov", "Varga", "Witcher", "Xu", "Yilmaz", "Zhang",
];

const INITIALS: &str = "ABCDEFGHJKLMNPRSTW";

/// The reference records loaded into an empty store.
pub fn fixture_people() -> Vec<NewPerson> {
    let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default();
    vec![
        NewPerson::new("Farid Ulyanov", date(1974, 8, 15), EyeColor::Blue),
        NewPerson::new("Salvador L. Witcher", date(1984, 5, 24), EyeColor::Brown),
        NewPerson::new("Kim Hu", date(1999, 4, 25), EyeColor::Hazel),
    ]
}

/// Inserts [`fixture_people`] when the store holds no records. Returns the
/// number inserted.
pub async fn load_fixtures(store: &PersonStore) -> Result<usize> {
    if store.count(&Criteria::all()).await? > 0 {
        debug!("store already populated, skipping fixtures");
        return Ok(0);
    }
    let fixtures = fixture_people();
    let n = fixtures.len();
    for person in fixtures {
        store.insert(person).await?;
    }
    Ok(n)
}

/// Produces synthetic people.
///
/// Names are a first name, an optional middle initial and a last name.
/// Birth dates are uniform over the last `max_age_years` years up to and
/// including `today`; eye colours are uniform over [`EyeColor::ALL`].
pub struct SampleDataGenerator {
    rng: StdRng,
    max_age_years: u32,
}

impl SampleDataGenerator {
    /// A generator seeded from `seed`, or from the OS when `None`.
    pub fn new(max_age_years: u32, seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        Self {
            rng: StdRng::seed_from_u64(seed),
            max_age_years,
        }
    }

    pub fn name(&mut self) -> String {
        let first = FIRST_NAMES[self.rng.random_range(0..FIRST_NAMES.len())];
        let last = LAST_NAMES[self.rng.random_range(0..LAST_NAMES.len())];
        if self.rng.random_bool(0.2) {
            let i = self.rng.random_range(0..INITIALS.len());
            format!("{first} {}. {last}", &INITIALS[i..=i])
        } else {
            format!("{first} {last}")
        }
    }

    pub fn birth(&mut self, today: NaiveDate) -> NaiveDate {
        let earliest = today
            .checked_sub_months(Months::new(self.max_age_years.saturating_mul(12)))
            .unwrap_or(NaiveDate::MIN);
        let span = (today - earliest).num_days().max(0) as u64;
        let offset = self.rng.random_range(0..=span);
        earliest.checked_add_days(Days::new(offset)).unwrap_or(today)
    }

    pub fn eyes(&mut self) -> EyeColor {
        EyeColor::ALL[self.rng.random_range(0..EyeColor::ALL.len())]
    }

    pub fn person(&mut self, today: NaiveDate) -> NewPerson {
        let name = self.name();
        let birth = self.birth(today);
        let eyes = self.eyes();
        NewPerson::new(name, birth, eyes)
    }

    /// Inserts `count` synthetic people one at a time. Stops at the first
    /// failed insert.
    pub async fn populate(&mut self, store: &PersonStore, count: usize) -> Result<usize> {
        let today = Local::now().date_naive();
        for i in 0..count {
            store.insert(self.person(today)).await?;
            if (i + 1) % 250 == 0 {
                debug!(inserted = i + 1, count, "seeding");
            }
        }
        Ok(count)
    }
}

/// Bootstrap seeding: fixtures (when enabled and the store is empty), then
/// `config.count` synthetic records. Any failure is returned to the caller,
/// which aborts startup.
pub async fn seed_store(store: &PersonStore, config: &SeedConfig) -> anyhow::Result<()> {
    if config.fixtures {
        let n = load_fixtures(store).await.context("loading fixture records")?;
        if n > 0 {
            info!(count = n, "fixture records loaded");
        }
    }

    let mut generator = SampleDataGenerator::new(config.max_age_years, config.rng_seed);
    let n = generator
        .populate(store, config.count)
        .await
        .context("generating sample records")?;

    let total = store.count(&Criteria::all()).await?;
    info!(generated = n, total, "sample data ready");
    Ok(())
}
