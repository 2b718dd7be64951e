//! Ranks dataset records for a requested time of day.

use serde::Serialize;
use thiserror::Error;

use crate::dataset::{Dataset, TimeCategory};
use crate::training::TrainedModel;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryTimeError {
    #[error("expected HH:MM, got {0:?}")]
    Format(String),
    #[error("time out of range: {0:?}")]
    OutOfRange(String),
}

/// Parse a 24-hour `hour:minute` string with one or two digits on each side.
pub fn parse_query_time(value: &str) -> Result<time::Time, QueryTimeError> {
    let format_err = || QueryTimeError::Format(value.to_string());
    let (hour, minute) = value.split_once(':').ok_or_else(format_err)?;
    let digits = |part: &str, max_len: usize| {
        !part.is_empty() && part.len() <= max_len && part.bytes().all(|b| b.is_ascii_digit())
    };
    if !digits(hour, 2) || !digits(minute, 2) {
        return Err(format_err());
    }
    let hour: u8 = hour.parse().map_err(|_| format_err())?;
    let minute: u8 = minute.parse().map_err(|_| format_err())?;
    time::Time::from_hms(hour, minute, 0)
        .map_err(|_| QueryTimeError::OutOfRange(value.to_string()))
}

/// One ranked record as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoctorPrediction {
    #[serde(rename = "NPI")]
    pub npi: u32,
    pub login_hour: u8,
    pub logout_hour: u8,
    pub session_duration: f64,
    #[serde(rename = "Count of Survey Attempts")]
    pub survey_attempts: i64,
    pub prediction_prob: f32,
}

/// Result of a ranking request before it reaches the HTTP boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum RankOutcome {
    /// Dataset or model could not be produced.
    Unavailable,
    InvalidTime,
    /// No records in the requested category.
    Empty,
    Found(Vec<DoctorPrediction>),
}

impl RankOutcome {
    pub fn into_doctors(self) -> Vec<DoctorPrediction> {
        match self {
            RankOutcome::Found(doctors) => doctors,
            RankOutcome::Unavailable | RankOutcome::InvalidTime | RankOutcome::Empty => Vec::new(),
        }
    }
}

/// Number of leading rows kept out of `len` for a signed `limit`.
///
/// A negative limit keeps everything except the last `|limit|` rows.
pub fn head_len(len: usize, limit: i64) -> usize {
    let magnitude = usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX);
    if limit >= 0 {
        magnitude.min(len)
    } else {
        len.saturating_sub(magnitude)
    }
}

/// Score every record of `category` and return the best `limit`, ordered by
/// probability then survey attempts, both descending.
pub fn rank_doctors(
    dataset: &Dataset,
    model: &TrainedModel,
    category: TimeCategory,
    limit: i64,
) -> Vec<DoctorPrediction> {
    let mut scored: Vec<DoctorPrediction> = dataset
        .in_category(category)
        .map(|record| DoctorPrediction {
            npi: record.provider_id,
            login_hour: record.login_hour,
            logout_hour: record.logout_hour,
            session_duration: record.session_minutes,
            survey_attempts: record.survey_attempts,
            prediction_prob: model.probability(&record.features(), category),
        })
        .collect();
    scored.sort_by(|a, b| {
        b.prediction_prob
            .total_cmp(&a.prediction_prob)
            .then_with(|| b.survey_attempts.cmp(&a.survey_attempts))
    });
    scored.truncate(head_len(scored.len(), limit));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Record;
    use crate::ml::gbdt::{GbdtModel, MODEL_VERSION, RegressionTree, TreeNode};

    fn record(provider_id: u32, login_hour: u8, attempts: i64) -> Record {
        Record {
            provider_id,
            login_hour,
            logout_hour: login_hour,
            session_minutes: 30.0,
            peak_hours: false,
            survey_attempts: attempts,
            time_category: TimeCategory::from_hour(login_hour),
        }
    }

    /// Morning probability rises with the provider id until id 3, then stays flat.
    fn stub_model() -> TrainedModel {
        let morning = RegressionTree {
            nodes: vec![
                TreeNode::Split {
                    feature_index: 0,
                    threshold: 1.5,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: 0.0 },
                TreeNode::Split {
                    feature_index: 0,
                    threshold: 2.5,
                    left: 3,
                    right: 4,
                },
                TreeNode::Leaf { value: 1.0 },
                TreeNode::Leaf { value: 2.0 },
            ],
        };
        let flat = RegressionTree::leaf(0.0);
        TrainedModel {
            model: GbdtModel {
                model_version: MODEL_VERSION,
                feature_len: 6,
                feature_names: Vec::new(),
                classes: TimeCategory::ALL.iter().map(|c| c.as_str().into()).collect(),
                learning_rate: 1.0,
                init_raw: vec![0.0; 4],
                trees: vec![vec![flat.clone(), morning, flat.clone(), flat]],
            },
            holdout: Vec::new(),
        }
    }

    fn dataset() -> Dataset {
        Dataset::new(
            vec![
                record(0, 7, 9),
                record(1, 8, 1),
                record(2, 9, 0),
                record(3, 10, 2),
                record(4, 11, 8),
                record(5, 14, 50),
                record(6, 3, 50),
            ],
            7,
        )
    }

    #[test]
    fn parses_strict_twenty_four_hour_times() {
        assert_eq!(parse_query_time("9:05").unwrap(), time::Time::from_hms(9, 5, 0).unwrap());
        assert_eq!(parse_query_time("23:59").unwrap().hour(), 23);
        assert_eq!(parse_query_time("00:00").unwrap().hour(), 0);
        assert!(matches!(parse_query_time("25:99"), Err(QueryTimeError::OutOfRange(_))));
        assert!(matches!(parse_query_time("24:00"), Err(QueryTimeError::OutOfRange(_))));
        let nine_oh_five = time::Time::from_hms(9, 5, 0).unwrap();
        assert_eq!(parse_query_time("9:5").unwrap(), nine_oh_five);
        assert_eq!(parse_query_time("09:5").unwrap(), nine_oh_five);
        assert!(matches!(parse_query_time("9:60"), Err(QueryTimeError::OutOfRange(_))));
        let malformed = [
            "abc", "", "9", "9:", ":05", "09:050", "+9:00", "09:00 ", " 09:00", "09:00:00",
            "123:00",
        ];
        for bad in malformed {
            assert!(
                matches!(parse_query_time(bad), Err(QueryTimeError::Format(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn ranks_by_probability_then_attempts() {
        let ranked = rank_doctors(&dataset(), &stub_model(), TimeCategory::Morning, 10);
        let ids: Vec<u32> = ranked.iter().map(|d| d.npi).collect();
        // Ids 3 and 4 tie on probability; more survey attempts wins.
        assert_eq!(ids, vec![4, 3, 2, 0, 1]);
        assert!(
            ranked
                .windows(2)
                .all(|pair| pair[0].prediction_prob >= pair[1].prediction_prob)
        );
    }

    #[test]
    fn results_stay_in_the_requested_category() {
        let data = dataset();
        for category in TimeCategory::ALL {
            let ranked = rank_doctors(&data, &stub_model(), category, 10);
            for doctor in &ranked {
                assert_eq!(TimeCategory::from_hour(doctor.login_hour), category);
            }
        }
        assert!(rank_doctors(&data, &stub_model(), TimeCategory::Evening, 10).is_empty());
    }

    #[test]
    fn limit_truncates_and_zero_returns_nothing() {
        let data = dataset();
        assert_eq!(rank_doctors(&data, &stub_model(), TimeCategory::Morning, 2).len(), 2);
        assert!(rank_doctors(&data, &stub_model(), TimeCategory::Morning, 0).is_empty());
    }

    #[test]
    fn negative_limit_drops_the_tail() {
        let data = dataset();
        let ids = |limit| -> Vec<u32> {
            rank_doctors(&data, &stub_model(), TimeCategory::Morning, limit)
                .iter()
                .map(|d| d.npi)
                .collect()
        };
        assert_eq!(ids(-3), vec![4, 3]);
        assert!(ids(-5).is_empty());
        assert!(ids(-50).is_empty());
        assert_eq!(head_len(5, i64::MIN), 0);
        assert_eq!(head_len(5, i64::MAX), 5);
    }

    #[test]
    fn serializes_with_contract_keys() {
        let doctor = DoctorPrediction {
            npi: 4,
            login_hour: 11,
            logout_hour: 13,
            session_duration: 120.0,
            survey_attempts: 8,
            prediction_prob: 0.5,
        };
        let json = serde_json::to_value(&doctor).unwrap();
        assert_eq!(json["NPI"], 4);
        assert_eq!(json["Count of Survey Attempts"], 8);
        assert_eq!(json["session_duration"], 120.0);
        assert_eq!(json["prediction_prob"], 0.5);
        assert_eq!(RankOutcome::Found(vec![doctor]).into_doctors().len(), 1);
        assert!(RankOutcome::InvalidTime.into_doctors().is_empty());
    }
}
