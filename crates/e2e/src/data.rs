//! Synthetic healthcare records for test setup
//!
//! Every generator draws from one [`Rng`], so a seeded generator yields the
//! same records on every run.

use std::str::FromStr;

use chrono::{Duration, NaiveDate, Utc};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::dates::{format_iso, today};
use crate::error::E2eError;

const FIRST_NAMES: &[&str] = &[
    "James", "Mary", "Robert", "Patricia", "John", "Jennifer", "Michael", "Linda", "David", "Elizabeth", "William",
    "Barbara", "Richard", "Susan", "Joseph", "Jessica", "Thomas", "Sarah", "Charles", "Karen",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez", "Martinez", "Hernandez",
    "Lopez", "Gonzalez", "Wilson", "Anderson", "Thomas", "Taylor", "Moore", "Jackson", "Martin",
];

const STREETS: &[&str] = &["Main St", "Oak Ave", "Maple Dr", "Cedar Ln", "Park Blvd", "Elm St", "Lake Rd"];

const CITIES: &[(&str, &str)] = &[
    ("Pittsburgh", "PA"),
    ("Columbus", "OH"),
    ("Austin", "TX"),
    ("Denver", "CO"),
    ("Raleigh", "NC"),
    ("Tampa", "FL"),
    ("Madison", "WI"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub mrn: String,
    pub first_name: String,
    pub last_name: String,
    pub dob: String,
    pub gender: String,
    pub ssn: String,
    pub phone: String,
    pub email: String,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Billing {
    pub invoice_number: String,
    pub amount: f64,
    pub date: String,
    pub payment_method: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub claim_id: String,
    pub patient_id: String,
    pub service_date: String,
    pub diagnosis_code: String,
    pub procedure_code: String,
    pub amount: f64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    #[serde(rename = "type")]
    pub kind: String,
    pub date: String,
    pub time: String,
    pub duration: u32,
    pub location: String,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insurance {
    pub provider: String,
    pub policy_number: String,
    pub group_number: String,
    pub subscriber_id: String,
    pub effective_date: String,
}

/// Patient payload for API tests. Absent fields are omitted from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admission_date: Option<String>,
}

/// Field broken by [`TestDataGenerator::invalid_patient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidField {
    FirstName,
    LastName,
    DateOfBirth,
    Gender,
    AdmissionDate,
    /// Everything but the first name is dropped
    MissingRequired,
}

impl FromStr for InvalidField {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "firstName" | "first_name" => Ok(InvalidField::FirstName),
            "lastName" | "last_name" => Ok(InvalidField::LastName),
            "dateOfBirth" | "date_of_birth" => Ok(InvalidField::DateOfBirth),
            "gender" => Ok(InvalidField::Gender),
            "admissionDate" | "admission_date" => Ok(InvalidField::AdmissionDate),
            "missingRequired" | "missing_required" => Ok(InvalidField::MissingRequired),
            other => Err(E2eError::UnknownField(other.to_string())),
        }
    }
}

pub struct TestDataGenerator<R: Rng = StdRng> {
    rng: R,
    today: NaiveDate,
}

impl TestDataGenerator<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy(), today())
    }

    /// Reproducible generator anchored at a fixed date
    pub fn seeded(seed: u64, today: NaiveDate) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), today)
    }
}

impl Default for TestDataGenerator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> TestDataGenerator<R> {
    pub fn with_rng(rng: R, today: NaiveDate) -> Self {
        Self { rng, today }
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items.choose(&mut self.rng).copied().unwrap_or_default()
    }

    fn digits(&mut self, len: usize) -> String {
        (0..len).map(|_| char::from(b'0' + self.rng.gen_range(0..10u8))).collect()
    }

    fn alphanumeric(&mut self, len: usize) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(|b| char::from(b).to_ascii_uppercase())
            .collect()
    }

    fn amount(&mut self, min: u32, max: u32) -> f64 {
        f64::from(self.rng.gen_range(min * 100..=max * 100)) / 100.0
    }

    fn days_back(&mut self, max: i64) -> String {
        format_iso(self.today - Duration::days(self.rng.gen_range(0..=max)))
    }

    fn days_ahead(&mut self, max: i64) -> String {
        format_iso(self.today + Duration::days(self.rng.gen_range(1..=max)))
    }

    /// Birth date for an adult aged 18 to 90
    fn birth_date(&mut self) -> String {
        format_iso(self.today - Duration::days(self.rng.gen_range(18 * 365..=90 * 365)))
    }

    pub fn patient(&mut self) -> Patient {
        let first_name = self.pick(FIRST_NAMES).to_string();
        let last_name = self.pick(LAST_NAMES).to_string();
        let (city, state) = *CITIES.choose(&mut self.rng).unwrap_or(&CITIES[0]);
        let email = format!(
            "{}.{}{}@example.com",
            first_name.to_lowercase(),
            last_name.to_lowercase(),
            self.rng.gen_range(1..1000)
        );

        Patient {
            mrn: format!("MRN-{}", self.digits(6)),
            dob: self.birth_date(),
            gender: self.pick(&["Male", "Female", "Other"]).to_string(),
            ssn: self.digits(9),
            phone: format!("({}) {}-{}", self.digits(3), self.digits(3), self.digits(4)),
            email,
            address: Address {
                street: format!("{} {}", self.rng.gen_range(1..9999), self.pick(STREETS)),
                city: city.to_string(),
                state: state.to_string(),
                zip: self.digits(5),
            },
            first_name,
            last_name,
        }
    }

    pub fn billing(&mut self) -> Billing {
        Billing {
            invoice_number: format!("INV-{}", self.digits(8)),
            amount: self.amount(100, 5000),
            date: self.days_back(30),
            payment_method: self.pick(&["Credit Card", "Insurance", "Cash", "Check"]).to_string(),
            status: self.pick(&["Pending", "Paid", "Overdue", "Cancelled"]).to_string(),
        }
    }

    pub fn claim(&mut self) -> Claim {
        Claim {
            claim_id: format!("CLM-{}", self.digits(10)),
            patient_id: self.digits(6),
            service_date: self.days_back(30),
            diagnosis_code: self.pick(&["M54.5", "E11.9", "I10", "J44.9"]).to_string(),
            procedure_code: self.pick(&["99213", "99214", "99215", "99203"]).to_string(),
            amount: self.amount(200, 2000),
            status: self.pick(&["Submitted", "In Review", "Approved", "Denied"]).to_string(),
        }
    }

    pub fn appointment(&mut self) -> Appointment {
        let hour = self.rng.gen_range(8..18);
        let minute = [0, 15, 30, 45][self.rng.gen_range(0..4)];
        let provider = format!("Dr. {} {}", self.pick(FIRST_NAMES), self.pick(LAST_NAMES));

        Appointment {
            kind: self
                .pick(&["Follow-up", "New Patient", "Consultation", "Procedure"])
                .to_string(),
            date: self.days_ahead(365),
            time: format!("{:02}:{:02}", hour, minute),
            duration: [15, 30, 45, 60][self.rng.gen_range(0..4)],
            location: self
                .pick(&["Main Clinic", "Outpatient Center", "Specialty Clinic"])
                .to_string(),
            provider,
        }
    }

    pub fn insurance(&mut self) -> Insurance {
        Insurance {
            provider: self
                .pick(&["Blue Cross", "Aetna", "United Healthcare", "Cigna", "Medicare"])
                .to_string(),
            policy_number: self.alphanumeric(12),
            group_number: self.alphanumeric(8),
            subscriber_id: self.digits(9),
            effective_date: self.days_back(365),
        }
    }

    /// Valid patient payload for API tests
    pub fn patient_payload(&mut self) -> PatientPayload {
        PatientPayload {
            first_name: Some(self.pick(FIRST_NAMES).to_string()),
            last_name: Some(self.pick(LAST_NAMES).to_string()),
            date_of_birth: Some(self.birth_date()),
            gender: Some(self.pick(&["M", "F"]).to_string()),
            admission_date: Some(self.days_back(30)),
        }
    }

    /// Patient payload with exactly one defect
    pub fn invalid_patient(&mut self, field: InvalidField) -> PatientPayload {
        let base = self.patient_payload();
        match field {
            InvalidField::FirstName => PatientPayload {
                first_name: Some(String::new()),
                ..base
            },
            InvalidField::LastName => PatientPayload {
                last_name: Some(String::new()),
                ..base
            },
            InvalidField::DateOfBirth => PatientPayload {
                date_of_birth: Some("invalid-date".into()),
                ..base
            },
            InvalidField::Gender => PatientPayload {
                gender: Some("X".into()),
                ..base
            },
            InvalidField::AdmissionDate => PatientPayload {
                admission_date: Some("not-a-date".into()),
                ..base
            },
            InvalidField::MissingRequired => PatientPayload {
                first_name: base.first_name,
                ..Default::default()
            },
        }
    }

    /// `<prefix>-<epoch millis>-<6 uppercase alphanumerics>`
    pub fn unique_id(&mut self, prefix: &str) -> String {
        format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), self.alphanumeric(6))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn generator() -> TestDataGenerator {
        TestDataGenerator::seeded(42, NaiveDate::from_ymd_opt(2025, 10, 17).unwrap())
    }

    #[test]
    fn test_seeded_generators_agree() {
        assert_eq!(generator().patient(), generator().patient());
        assert_eq!(generator().claim(), generator().claim());
    }

    #[test]
    fn test_patient_shape() {
        let patient = generator().patient();
        assert!(patient.mrn.starts_with("MRN-"));
        assert_eq!(patient.mrn.len(), 10);
        assert_eq!(patient.ssn.len(), 9);
        assert!(patient.dob <= "2007-10-23".to_string());

        let json = serde_json::to_value(&patient).unwrap();
        assert!(json.get("firstName").is_some());
        assert!(json["address"].get("zip").is_some());
    }

    #[test]
    fn test_amounts_have_two_decimals() {
        let mut gen = generator();
        for _ in 0..20 {
            let billing = gen.billing();
            assert!((100.0..=5000.0).contains(&billing.amount));
            assert_eq!((billing.amount * 100.0).round() / 100.0, billing.amount);
        }
    }

    #[test]
    fn test_appointment_is_in_the_future() {
        let appointment = generator().appointment();
        assert!(appointment.date > "2025-10-17".to_string());
        assert_eq!(appointment.time.len(), 5);
        let json = serde_json::to_value(&appointment).unwrap();
        assert!(json.get("type").is_some());
    }

    #[test_case("firstName", "firstName", "" ; "blank first name")]
    #[test_case("lastName", "lastName", "" ; "blank last name")]
    #[test_case("dateOfBirth", "dateOfBirth", "invalid-date" ; "bad birth date")]
    #[test_case("gender", "gender", "X" ; "bad gender")]
    #[test_case("admissionDate", "admissionDate", "not-a-date" ; "bad admission date")]
    fn test_invalid_patient(field: &str, key: &str, expected: &str) {
        let field: InvalidField = field.parse().unwrap();
        let json = serde_json::to_value(generator().invalid_patient(field)).unwrap();
        assert_eq!(json[key], expected);
        assert_eq!(json.as_object().unwrap().len(), 5);
    }

    #[test]
    fn test_missing_required_keeps_only_first_name() {
        let json = serde_json::to_value(generator().invalid_patient(InvalidField::MissingRequired)).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert!(object.contains_key("firstName"));
    }

    #[test]
    fn test_unknown_invalid_field() {
        assert!(matches!("middleName".parse::<InvalidField>(), Err(E2eError::UnknownField(_))));
    }

    #[test]
    fn test_unique_id_format() {
        let id = generator().unique_id("PAT");
        let parts: Vec<_> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "PAT");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
