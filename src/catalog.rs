use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::error::Result;
use crate::generator::{Category, FieldSpec, Generator, Sampler};
use crate::models::{Table, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Country {
    pub name: &'static str,
    pub code: &'static str,
    pub lat: f64,
    pub lon: f64,
}

impl Category for Country {
    fn identity(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("country", Value::from(self.name)),
            ("code", Value::from(self.code)),
            ("lat", Value::Float(self.lat)),
            ("lon", Value::Float(self.lon)),
        ]
    }

    fn key(&self) -> Value {
        Value::from(self.code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Province {
    pub name: &'static str,
    pub code: &'static str,
    pub visitors: (i64, i64),
}

impl Category for Province {
    fn identity(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("province", Value::from(self.name)),
            ("code", Value::from(self.code)),
        ]
    }

    fn key(&self) -> Value {
        Value::from(self.code)
    }

    fn sampler_for(&self, field: &str) -> Option<Sampler> {
        match field {
            "visitors" => Some(Sampler::UniformInt {
                min: self.visitors.0,
                max: self.visitors.1,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Product(pub &'static str);

impl Category for Product {
    fn identity(&self) -> Vec<(&'static str, Value)> {
        vec![("product", Value::from(self.0))]
    }

    fn key(&self) -> Value {
        Value::from(self.0)
    }
}

pub const COUNTRIES: &[Country] = &[
    Country {
        name: "Canada",
        code: "CAN",
        lat: 56.1304,
        lon: -106.3468,
    },
    Country {
        name: "United States",
        code: "USA",
        lat: 37.0902,
        lon: -95.7129,
    },
    Country {
        name: "France",
        code: "FRA",
        lat: 46.2276,
        lon: 2.2137,
    },
    Country {
        name: "Germany",
        code: "DEU",
        lat: 51.1657,
        lon: 10.4515,
    },
    Country {
        name: "United Kingdom",
        code: "GBR",
        lat: 55.3781,
        lon: -3.4360,
    },
    Country {
        name: "Japan",
        code: "JPN",
        lat: 36.2048,
        lon: 138.2529,
    },
    Country {
        name: "Australia",
        code: "AUS",
        lat: -25.2744,
        lon: 133.7751,
    },
    Country {
        name: "Brazil",
        code: "BRA",
        lat: -14.2350,
        lon: -51.9253,
    },
    Country {
        name: "India",
        code: "IND",
        lat: 20.5937,
        lon: 78.9629,
    },
    Country {
        name: "China",
        code: "CHN",
        lat: 35.8617,
        lon: 104.1954,
    },
];

pub const PROVINCES: &[Province] = &[
    Province {
        name: "Ontario",
        code: "ON",
        visitors: (1000, 3000),
    },
    Province {
        name: "Quebec",
        code: "QC",
        visitors: (800, 2500),
    },
    Province {
        name: "British Columbia",
        code: "BC",
        visitors: (600, 2000),
    },
    Province {
        name: "Alberta",
        code: "AB",
        visitors: (500, 1800),
    },
    Province {
        name: "Manitoba",
        code: "MB",
        visitors: (200, 800),
    },
    Province {
        name: "Saskatchewan",
        code: "SK",
        visitors: (150, 600),
    },
    Province {
        name: "Nova Scotia",
        code: "NS",
        visitors: (200, 700),
    },
    Province {
        name: "New Brunswick",
        code: "NB",
        visitors: (150, 500),
    },
    Province {
        name: "Newfoundland and Labrador",
        code: "NL",
        visitors: (100, 400),
    },
    Province {
        name: "Prince Edward Island",
        code: "PE",
        visitors: (50, 200),
    },
];

pub const PRODUCTS: &[Product] = &[
    Product("Laptop Pro 15"),
    Product("Smartphone X"),
    Product("Tablet Ultra"),
    Product("Headphones Premium"),
    Product("Camera DSLR"),
    Product("Monitor 4K"),
    Product("Keyboard Mechanical"),
    Product("Mouse Wireless"),
    Product("Speaker Bluetooth"),
    Product("Watch Smart"),
];

pub const PRODUCT_CATEGORIES: &[&str] = &["Electronics", "Accessories", "Computers", "Audio"];

pub const CHANNELS: &[&str] = &[
    "Google Ads",
    "Facebook",
    "Instagram",
    "LinkedIn",
    "Twitter",
    "Email",
    "SEO",
    "Direct",
];

/// Headline daily metrics. `conversions` is in percent points.
pub const OVERVIEW_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("sales", Sampler::UniformInt { min: 50, max: 200 }),
    FieldSpec::new("customers", Sampler::UniformInt { min: 100, max: 500 }),
    FieldSpec::new(
        "revenue",
        Sampler::Uniform {
            min: 1000.0,
            max: 5000.0,
        },
    )
    .rounded(2),
    FieldSpec::new("conversions", Sampler::Uniform { min: 2.0, max: 8.0 }).rounded(2),
];

pub const SALES_FIELDS: &[FieldSpec] = &[
    FieldSpec::new(
        "sales",
        Sampler::GaussianInt {
            mean: 100.0,
            std_dev: 30.0,
            min: 10,
            max: None,
        },
    )
    .weekend_boosted(),
    FieldSpec::new(
        "revenue",
        Sampler::Scaled {
            source: "sales",
            min: 20.0,
            max: 80.0,
        },
    ),
    FieldSpec::new(
        "customers",
        Sampler::ScaledInt {
            source: "sales",
            min: 0.3,
            max: 0.8,
            floor: 5,
        },
    ),
    FieldSpec::new(
        "avg_order_value",
        Sampler::Uniform {
            min: 25.0,
            max: 150.0,
        },
    ),
];

pub const USER_FIELDS: &[FieldSpec] = &[
    FieldSpec::new(
        "active_users",
        Sampler::UniformInt {
            min: 500,
            max: 2000,
        },
    ),
    FieldSpec::new(
        "new_users",
        Sampler::ScaledInt {
            source: "active_users",
            min: 0.05,
            max: 0.15,
            floor: 10,
        },
    ),
    FieldSpec::new(
        "returning_users",
        Sampler::Difference {
            minuend: "active_users",
            subtrahend: "new_users",
        },
    ),
    FieldSpec::new(
        "session_duration",
        Sampler::Uniform {
            min: 120.0,
            max: 600.0,
        },
    ),
    FieldSpec::new(
        "page_views",
        Sampler::ScaledByInt {
            source: "active_users",
            min: 2,
            max: 8,
        },
    ),
    FieldSpec::new("bounce_rate", Sampler::Uniform { min: 0.2, max: 0.7 }),
];

/// Metrics following the diurnal `traffic` column of the hourly table.
pub const TRAFFIC_FIELDS: &[FieldSpec] = &[
    FieldSpec::new(
        "bounce_rate",
        Sampler::Gaussian {
            mean: 0.4,
            std_dev: 0.1,
            min: 0.1,
            max: Some(0.9),
        },
    ),
    FieldSpec::new(
        "page_views",
        Sampler::ScaledByInt {
            source: "traffic",
            min: 2,
            max: 5,
        },
    ),
    FieldSpec::new(
        "session_duration",
        Sampler::Gaussian {
            mean: 180.0,
            std_dev: 60.0,
            min: 30.0,
            max: None,
        },
    ),
];

pub const COUNTRY_FIELDS: &[FieldSpec] = &[
    FieldSpec::new(
        "visitors",
        Sampler::UniformInt {
            min: 100,
            max: 5000,
        },
    ),
    FieldSpec::new(
        "revenue",
        Sampler::Scaled {
            source: "visitors",
            min: 10.0,
            max: 100.0,
        },
    )
    .rounded(2),
    FieldSpec::new(
        "conversion_rate",
        Sampler::Uniform {
            min: 0.01,
            max: 0.08,
        },
    )
    .rounded(4),
    FieldSpec::new("avg_session_duration", Sampler::UniformInt { min: 120, max: 600 }),
];

/// Provinces override `visitors` with their own range.
pub const PROVINCE_FIELDS: &[FieldSpec] = &[FieldSpec::new(
    "visitors",
    Sampler::UniformInt { min: 50, max: 3000 },
)];

pub const PRODUCT_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("units_sold", Sampler::UniformInt { min: 50, max: 500 }),
    FieldSpec::new(
        "revenue",
        Sampler::Uniform {
            min: 5000.0,
            max: 50000.0,
        },
    ),
    FieldSpec::new("rating", Sampler::Uniform { min: 3.5, max: 5.0 }),
    FieldSpec::new("reviews", Sampler::UniformInt { min: 10, max: 200 }),
    FieldSpec::new("category", Sampler::Choice(PRODUCT_CATEGORIES)),
];

pub const MARKETING_FIELDS: &[FieldSpec] = &[
    FieldSpec::new(
        "spend",
        Sampler::Uniform {
            min: 100.0,
            max: 1000.0,
        },
    ),
    FieldSpec::new(
        "impressions",
        Sampler::ScaledInt {
            source: "spend",
            min: 50.0,
            max: 200.0,
            floor: 0,
        },
    ),
    FieldSpec::new(
        "clicks",
        Sampler::ScaledInt {
            source: "impressions",
            min: 0.01,
            max: 0.05,
            floor: 0,
        },
    ),
    FieldSpec::new(
        "conversions",
        Sampler::ScaledInt {
            source: "clicks",
            min: 0.02,
            max: 0.08,
            floor: 0,
        },
    ),
    FieldSpec::new(
        "cpc",
        Sampler::Ratio {
            numerator: "spend",
            denominator: "clicks",
        },
    ),
    FieldSpec::new(
        "ctr",
        Sampler::Ratio {
            numerator: "clicks",
            denominator: "impressions",
        },
    ),
    FieldSpec::new(
        "conversion_rate",
        Sampler::Ratio {
            numerator: "conversions",
            denominator: "clicks",
        },
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatasetKind {
    Overview,
    Sales,
    Users,
    Traffic,
    Countries,
    Provinces,
    Products,
    Marketing,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 8] = [
        DatasetKind::Overview,
        DatasetKind::Sales,
        DatasetKind::Users,
        DatasetKind::Traffic,
        DatasetKind::Countries,
        DatasetKind::Provinces,
        DatasetKind::Products,
        DatasetKind::Marketing,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DatasetKind::Overview => "overview",
            DatasetKind::Sales => "sales",
            DatasetKind::Users => "users",
            DatasetKind::Traffic => "traffic",
            DatasetKind::Countries => "countries",
            DatasetKind::Provinces => "provinces",
            DatasetKind::Products => "products",
            DatasetKind::Marketing => "marketing",
        }
    }

    /// Whether the day count changes the output.
    pub fn is_dated(self) -> bool {
        !matches!(
            self,
            DatasetKind::Countries | DatasetKind::Provinces | DatasetKind::Products
        )
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatasetKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        DatasetKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<&str> = DatasetKind::ALL.iter().map(|k| k.name()).collect();
                format!("unknown dataset `{s}` (expected one of: {})", names.join(", "))
            })
    }
}

impl<R: Rng> Generator<R> {
    pub fn overview(&mut self, days: i64) -> Result<Table> {
        self.daily(days, OVERVIEW_FIELDS)
    }

    pub fn sales(&mut self, days: i64) -> Result<Table> {
        self.daily(days, SALES_FIELDS)
    }

    pub fn users(&mut self, days: i64) -> Result<Table> {
        self.daily(days, USER_FIELDS)
    }

    pub fn traffic(&mut self, days: i64) -> Result<Table> {
        self.hourly(days)
    }

    pub fn countries(&mut self) -> Result<Table> {
        self.categorical(COUNTRIES, COUNTRY_FIELDS)
    }

    pub fn provinces(&mut self) -> Result<Table> {
        self.categorical(PROVINCES, PROVINCE_FIELDS)
    }

    pub fn products(&mut self) -> Result<Table> {
        self.categorical(PRODUCTS, PRODUCT_FIELDS)
    }

    pub fn marketing(&mut self, days: i64) -> Result<Table> {
        self.daily_by_category(days, "channel", CHANNELS, MARKETING_FIELDS)
    }

    /// Generate `kind`; `days` is ignored by the categorical datasets.
    pub fn dataset(&mut self, kind: DatasetKind, days: i64) -> Result<Table> {
        match kind {
            DatasetKind::Overview => self.overview(days),
            DatasetKind::Sales => self.sales(days),
            DatasetKind::Users => self.users(days),
            DatasetKind::Traffic => self.traffic(days),
            DatasetKind::Countries => self.countries(),
            DatasetKind::Provinces => self.provinces(),
            DatasetKind::Products => self.products(),
            DatasetKind::Marketing => self.marketing(days),
        }
    }
}
