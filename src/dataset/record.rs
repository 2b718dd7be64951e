use serde::{Deserialize, Serialize};

/// Number of `f32` values in a record's feature vector.
pub const FEATURE_LEN: usize = 6;

/// Feature names in vector order.
pub const FEATURE_NAMES: [&str; FEATURE_LEN] = [
    "provider_id",
    "login_hour",
    "logout_hour",
    "session_duration",
    "peak_hours",
    "survey_attempts",
];

/// Time-of-day bucket derived from an hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeCategory {
    /// `[0, 6)`
    Night,
    /// `[6, 12)`
    Morning,
    /// `[12, 18)`
    Afternoon,
    /// `[18, 24)`
    Evening,
}

impl TimeCategory {
    /// All categories in class-index order.
    pub const ALL: [TimeCategory; 4] = [
        TimeCategory::Night,
        TimeCategory::Morning,
        TimeCategory::Afternoon,
        TimeCategory::Evening,
    ];

    /// Bucket an hour of day. Hours past 23 fall into the evening bucket.
    pub fn from_hour(hour: u8) -> Self {
        match hour {
            0..=5 => TimeCategory::Night,
            6..=11 => TimeCategory::Morning,
            12..=17 => TimeCategory::Afternoon,
            _ => TimeCategory::Evening,
        }
    }

    /// Class index used by the classifier.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeCategory::Night => "night",
            TimeCategory::Morning => "morning",
            TimeCategory::Afternoon => "afternoon",
            TimeCategory::Evening => "evening",
        }
    }
}

/// Whether a login hour falls inside the closed peak window `[9, 18]`.
pub fn is_peak_hour(hour: u8) -> bool {
    (9..=18).contains(&hour)
}

/// One complete, preprocessed row of the source dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Dense encoding of the provider identifier.
    pub provider_id: u32,
    pub login_hour: u8,
    pub logout_hour: u8,
    /// `(logout - login)` in minutes; negative when logout precedes login.
    pub session_minutes: f64,
    pub peak_hours: bool,
    pub survey_attempts: i64,
    /// Bucket of `login_hour`.
    pub time_category: TimeCategory,
}

impl Record {
    /// Feature vector in [`FEATURE_NAMES`] order.
    pub fn features(&self) -> [f32; FEATURE_LEN] {
        [
            self.provider_id as f32,
            f32::from(self.login_hour),
            f32::from(self.logout_hour),
            self.session_minutes as f32,
            if self.peak_hours { 1.0 } else { 0.0 },
            self.survey_attempts as f32,
        ]
    }
}

/// Ordered, densely indexed collection of records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Vec<Record>,
    provider_count: usize,
}

impl Dataset {
    pub fn new(records: Vec<Record>, provider_count: usize) -> Self {
        Self {
            records,
            provider_count,
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of distinct identifiers seen by the encoder, dropped rows included.
    pub fn provider_count(&self) -> usize {
        self.provider_count
    }

    /// Records whose login hour falls in `category`, in dataset order.
    pub fn in_category(&self, category: TimeCategory) -> impl Iterator<Item = &Record> {
        self.records
            .iter()
            .filter(move |record| record.time_category == category)
    }
}
