//! Synthetic data generation behind a stable `category.method` contract.
//!
//! The renderer addresses generators as `faker.<category>.<method>`; this
//! module maps those names onto the `fake` crate. Unrecognized methods fall
//! back to their category's default and unrecognized categories to free
//! text, so a typo in a template degrades to plausible data instead of an
//! error. Swapping the underlying generator library only touches this file.

use fake::faker::address::en::{CityName, CountryName, StateName, StreetName, ZipCode};
use fake::faker::chrono::en::{DateTime, DateTimeAfter, DateTimeBefore};
use fake::faker::company::en::{
    Buzzword, CatchPhrase, CompanyName, CompanySuffix, Industry, Profession,
};
use fake::faker::creditcard::en::CreditCardNumber;
use fake::faker::currency::en::{CurrencyCode, CurrencyName, CurrencySymbol};
use fake::faker::internet::en::{
    DomainSuffix, FreeEmail, IPv4, IPv6, MACAddress, Password, UserAgent, Username,
};
use fake::faker::lorem::en::{Paragraph, Sentence, Word};
use fake::faker::name::en::{FirstName, LastName, Name, Title};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::Rng;

/// Generate a synthetic value for `category.method`.
pub fn generate(category: &str, method: &str) -> String {
    match category {
        "person" => person(method),
        "internet" => internet(method),
        "address" => address(method),
        "company" => company(method),
        "commerce" => commerce(method),
        "date" => date(method),
        "lorem" | "text" => lorem(method),
        "finance" => finance(method),
        "image" => image(method),
        _ => Word().fake(),
    }
}

fn person(method: &str) -> String {
    match method {
        "firstName" => FirstName().fake(),
        "lastName" => LastName().fake(),
        "title" => Title().fake(),
        "phone" | "phoneNumber" => PhoneNumber().fake(),
        // "fullName" and anything unrecognized
        _ => Name().fake(),
    }
}

fn internet(method: &str) -> String {
    match method {
        "username" | "userName" => Username().fake(),
        "password" => Password(10..16).fake(),
        "ipv4" | "ip" => IPv4().fake(),
        "ipv6" => IPv6().fake(),
        "mac" | "macAddress" => MACAddress().fake(),
        "userAgent" => UserAgent().fake(),
        "domain" => {
            let word: String = Word().fake();
            let suffix: String = DomainSuffix().fake();
            format!("{}.{}", word.to_lowercase(), suffix)
        }
        "url" => {
            let word: String = Word().fake();
            let path: String = Word().fake();
            format!("https://{}.example.com/{}", word.to_lowercase(), path)
        }
        // "email" and anything unrecognized
        _ => FreeEmail().fake(),
    }
}

fn address(method: &str) -> String {
    match method {
        "street" | "streetName" => StreetName().fake(),
        "country" => CountryName().fake(),
        "state" => StateName().fake(),
        "zip" | "zipCode" | "postalCode" => ZipCode().fake(),
        "latitude" => format!("{:.6}", rand::thread_rng().gen_range(-90.0..90.0f64)),
        "longitude" => format!("{:.6}", rand::thread_rng().gen_range(-180.0..180.0f64)),
        // "city" and anything unrecognized
        _ => CityName().fake(),
    }
}

fn company(method: &str) -> String {
    match method {
        "suffix" => CompanySuffix().fake(),
        "industry" => Industry().fake(),
        "buzzword" => Buzzword().fake(),
        "catchPhrase" => CatchPhrase().fake(),
        "profession" => Profession().fake(),
        // "name" and anything unrecognized
        _ => CompanyName().fake(),
    }
}

fn commerce(method: &str) -> String {
    match method {
        "price" => format!("{:.2}", rand::thread_rng().gen_range(1.0..1000.0f64)),
        "department" => Industry().fake(),
        "sku" => format!("SKU-{:05}", rand::thread_rng().gen_range(0..100_000u32)),
        // "productName" and anything unrecognized
        _ => {
            let adjective: String = Buzzword().fake();
            let noun: String = Word().fake();
            format!("{} {}", capitalize(&adjective), capitalize(&noun))
        }
    }
}

fn date(method: &str) -> String {
    let now = chrono::Utc::now();
    match method {
        "past" | "recent" => {
            let dt: chrono::DateTime<chrono::Utc> = DateTimeBefore(now).fake();
            dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        }
        "future" => {
            let dt: chrono::DateTime<chrono::Utc> = DateTimeAfter(now).fake();
            dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        }
        "date" => {
            let dt: chrono::DateTime<chrono::Utc> = DateTime().fake();
            dt.format("%Y-%m-%d").to_string()
        }
        "timestamp" | "unix" => {
            let dt: chrono::DateTime<chrono::Utc> = DateTime().fake();
            dt.timestamp().to_string()
        }
        // "iso" and anything unrecognized
        _ => {
            let dt: chrono::DateTime<chrono::Utc> = DateTime().fake();
            dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        }
    }
}

fn lorem(method: &str) -> String {
    match method {
        "sentence" => Sentence(4..10).fake(),
        "paragraph" => Paragraph(2..5).fake(),
        "slug" => {
            let a: String = Word().fake();
            let b: String = Word().fake();
            format!("{}-{}", a.to_lowercase(), b.to_lowercase())
        }
        // "word" and anything unrecognized
        _ => Word().fake(),
    }
}

fn finance(method: &str) -> String {
    match method {
        "currencyCode" => CurrencyCode().fake(),
        "currencyName" => CurrencyName().fake(),
        "currencySymbol" => CurrencySymbol().fake(),
        "creditCard" | "creditCardNumber" => CreditCardNumber().fake(),
        // "amount" and anything unrecognized
        _ => format!("{:.2}", rand::thread_rng().gen_range(1.0..10_000.0f64)),
    }
}

fn image(method: &str) -> String {
    let mut rng = rand::thread_rng();
    match method {
        "avatar" => format!("https://i.pravatar.cc/150?u={}", rng.gen_range(1..10_000u32)),
        "placeholder" => "https://via.placeholder.com/300x200".to_string(),
        // "url" and anything unrecognized
        _ => {
            let width = rng.gen_range(2..13u32) * 100;
            let height = rng.gen_range(2..13u32) * 100;
            format!("https://picsum.photos/{width}/{height}")
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
