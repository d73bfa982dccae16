use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_YEAR_BUILT: i32 = 1800;
const MAX_ROOMS: f64 = 50.0;
const MIN_SQUARE_FEET: u32 = 100;
const MAX_SQUARE_FEET: u32 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyField {
    Price,
    Bedrooms,
    Bathrooms,
    SquareFeet,
    Address,
    City,
    State,
    ZipCode,
    PropertyType,
    YearBuilt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: PropertyField,
    pub message: String,
}

impl FieldError {
    fn new(field: PropertyField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    #[default]
    #[serde(rename = "Single Family Home")]
    SingleFamilyHome,
    #[serde(rename = "Condo")]
    Condo,
    #[serde(rename = "Townhouse")]
    Townhouse,
    #[serde(rename = "Multi-Family")]
    MultiFamily,
    #[serde(rename = "Land")]
    Land,
    #[serde(rename = "Commercial")]
    Commercial,
}

impl PropertyType {
    pub const ALL: [PropertyType; 6] = [
        PropertyType::SingleFamilyHome,
        PropertyType::Condo,
        PropertyType::Townhouse,
        PropertyType::MultiFamily,
        PropertyType::Land,
        PropertyType::Commercial,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PropertyType::SingleFamilyHome => "Single Family Home",
            PropertyType::Condo => "Condo",
            PropertyType::Townhouse => "Townhouse",
            PropertyType::MultiFamily => "Multi-Family",
            PropertyType::Land => "Land",
            PropertyType::Commercial => "Commercial",
        }
    }

    fn variant_name(self) -> &'static str {
        match self {
            PropertyType::SingleFamilyHome => "SingleFamilyHome",
            PropertyType::Condo => "Condo",
            PropertyType::Townhouse => "Townhouse",
            PropertyType::MultiFamily => "MultiFamily",
            PropertyType::Land => "Land",
            PropertyType::Commercial => "Commercial",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PropertyType {
    type Err = ();

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let needle = input.trim();
        PropertyType::ALL
            .into_iter()
            .find(|kind| {
                kind.label().eq_ignore_ascii_case(needle)
                    || kind.variant_name().eq_ignore_ascii_case(needle)
            })
            .ok_or(())
    }
}

/// Typed property attributes, produced only by [`PropertyDraft::validate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyRecord {
    pub price: String,
    pub bedrooms: u32,
    pub bathrooms: f64,
    pub square_feet: u32,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub property_type: PropertyType,
    pub year_built: Option<i32>,
    pub lot_size: Option<String>,
}

/// Raw form input, exactly as typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyDraft {
    pub price: String,
    pub bedrooms: String,
    pub bathrooms: String,
    pub square_feet: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub property_type: String,
    pub year_built: String,
    pub lot_size: String,
}

impl Default for PropertyDraft {
    fn default() -> Self {
        Self {
            price: String::new(),
            bedrooms: String::new(),
            bathrooms: String::new(),
            square_feet: String::new(),
            address: String::new(),
            city: String::new(),
            state: String::new(),
            zip_code: String::new(),
            property_type: PropertyType::default().label().to_string(),
            year_built: String::new(),
            lot_size: String::new(),
        }
    }
}

impl From<&PropertyRecord> for PropertyDraft {
    fn from(record: &PropertyRecord) -> Self {
        Self {
            price: record.price.clone(),
            bedrooms: record.bedrooms.to_string(),
            bathrooms: record.bathrooms.to_string(),
            square_feet: record.square_feet.to_string(),
            address: record.address.clone(),
            city: record.city.clone(),
            state: record.state.clone(),
            zip_code: record.zip_code.clone(),
            property_type: record.property_type.label().to_string(),
            year_built: record.year_built.map(|y| y.to_string()).unwrap_or_default(),
            lot_size: record.lot_size.clone().unwrap_or_default(),
        }
    }
}

impl PropertyDraft {
    /// Validates against the current UTC calendar year.
    pub fn parse(&self) -> Result<PropertyRecord, Vec<FieldError>> {
        self.validate(Utc::now().year())
    }

    pub fn validate(&self, current_year: i32) -> Result<PropertyRecord, Vec<FieldError>> {
        let mut errors = Vec::new();
        let e = &mut errors;

        let price = keep(e, price(&self.price));
        let bedrooms = keep(e, bedrooms(&self.bedrooms));
        let bathrooms = keep(e, bathrooms(&self.bathrooms));
        let square_feet = keep(e, square_feet(&self.square_feet));
        let address = keep(e, required(PropertyField::Address, "Street address", &self.address));
        let city = keep(e, required(PropertyField::City, "City", &self.city));
        let state = keep(e, state(&self.state));
        let zip_code = keep(e, required(PropertyField::ZipCode, "Zip code", &self.zip_code));
        let property_type = keep(e, property_type(&self.property_type));
        let year_built = keep(e, year_built(&self.year_built, current_year));
        let lot_size = optional(&self.lot_size);

        match (
            price,
            bedrooms,
            bathrooms,
            square_feet,
            address,
            city,
            state,
            zip_code,
            property_type,
            year_built,
        ) {
            (
                Some(price),
                Some(bedrooms),
                Some(bathrooms),
                Some(square_feet),
                Some(address),
                Some(city),
                Some(state),
                Some(zip_code),
                Some(property_type),
                Some(year_built),
            ) => Ok(PropertyRecord {
                price,
                bedrooms,
                bathrooms,
                square_feet,
                address,
                city,
                state,
                zip_code,
                property_type,
                year_built,
                lot_size,
            }),
            _ => Err(errors),
        }
    }
}

fn keep<T>(errors: &mut Vec<FieldError>, result: Result<T, FieldError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            errors.push(err);
            None
        }
    }
}

fn optional(raw: &str) -> Option<String> {
    Some(raw.trim().to_string()).filter(|v| !v.is_empty())
}

fn required(field: PropertyField, label: &str, raw: &str) -> Result<String, FieldError> {
    optional(raw).ok_or_else(|| FieldError::new(field, format!("{label} is required")))
}

fn price(raw: &str) -> Result<String, FieldError> {
    let value = required(PropertyField::Price, "Price", raw)?;
    if !value.chars().any(|c| c.is_ascii_digit()) {
        return Err(FieldError::new(
            PropertyField::Price,
            "Price must contain a number",
        ));
    }
    Ok(value)
}

fn whole_number(field: PropertyField, label: &str, raw: &str) -> Result<i64, FieldError> {
    let value = required(field, label, raw)?;
    value
        .parse::<i64>()
        .map_err(|_| FieldError::new(field, format!("{label} must be a whole number")))
}

fn bedrooms(raw: &str) -> Result<u32, FieldError> {
    let value = whole_number(PropertyField::Bedrooms, "Bedrooms", raw)?;
    if !(0..=MAX_ROOMS as i64).contains(&value) {
        return Err(FieldError::new(
            PropertyField::Bedrooms,
            "Bedrooms must be between 0 and 50",
        ));
    }
    Ok(value as u32)
}

fn bathrooms(raw: &str) -> Result<f64, FieldError> {
    let field = PropertyField::Bathrooms;
    let value = required(field, "Bathrooms", raw)?;
    let parsed = value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FieldError::new(field, "Bathrooms must be a number"))?;
    if !(0.0..=MAX_ROOMS).contains(&parsed) {
        return Err(FieldError::new(field, "Bathrooms must be between 0 and 50"));
    }
    if (parsed * 2.0).fract() != 0.0 {
        return Err(FieldError::new(
            field,
            "Bathrooms must be in increments of 0.5",
        ));
    }
    Ok(parsed)
}

fn square_feet(raw: &str) -> Result<u32, FieldError> {
    let field = PropertyField::SquareFeet;
    let value = whole_number(field, "Square feet", raw)?;
    if !(MIN_SQUARE_FEET as i64..=MAX_SQUARE_FEET as i64).contains(&value) {
        return Err(FieldError::new(
            field,
            "Square feet must be between 100 and 1,000,000",
        ));
    }
    Ok(value as u32)
}

fn state(raw: &str) -> Result<String, FieldError> {
    let value = required(PropertyField::State, "State", raw)?;
    if value.len() != 2 || !value.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(FieldError::new(
            PropertyField::State,
            "State must be a 2-letter code",
        ));
    }
    Ok(value.to_ascii_uppercase())
}

fn property_type(raw: &str) -> Result<PropertyType, FieldError> {
    if raw.trim().is_empty() {
        return Ok(PropertyType::default());
    }
    raw.parse::<PropertyType>().map_err(|_| {
        FieldError::new(
            PropertyField::PropertyType,
            format!("Unknown property type: {}", raw.trim()),
        )
    })
}

fn year_built(raw: &str, current_year: i32) -> Result<Option<i32>, FieldError> {
    let Some(value) = optional(raw) else {
        return Ok(None);
    };
    let field = PropertyField::YearBuilt;
    let year = value
        .parse::<i32>()
        .map_err(|_| FieldError::new(field, "Year built must be a whole number"))?;
    if !(MIN_YEAR_BUILT..=current_year).contains(&year) {
        return Err(FieldError::new(
            field,
            format!("Year built must be between {MIN_YEAR_BUILT} and {current_year}"),
        ));
    }
    Ok(Some(year))
}
