use serde::{Deserialize, Serialize};

use super::ModelError;

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The string form doubles as the serde wire form.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            pub fn all() -> &'static [$name] {
                &[$(Self::$variant),+]
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(AlertType {
    Appointment => "appointment",
    Medication => "medication",
    FollowUp => "follow_up",
    LabResults => "lab_results",
    Task => "task",
    Other => "other",
});

impl AlertType {
    /// Card label shown next to the alert icon.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Appointment => "Appointment",
            Self::Medication => "Medication",
            Self::FollowUp => "Follow-up",
            Self::LabResults => "Lab results",
            Self::Task => "Task",
            Self::Other => "Reminder",
        }
    }
}

str_enum!(AlertPriority {
    Low => "low",
    Medium => "medium",
    High => "high",
});

impl AlertPriority {
    /// Numeric rank, higher is more urgent.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }
}

str_enum!(Gender {
    Male => "male",
    Female => "female",
});

str_enum!(RecordType {
    Consultation => "consultation",
    Lab => "lab",
    Prescription => "prescription",
    VitalSigns => "vital_signs",
    Other => "other",
});

str_enum!(DateRange {
    Today => "today",
    ThisWeek => "this-week",
    ThisMonth => "this-month",
    ThisYear => "this-year",
});

str_enum!(AlertTab {
    Pending => "pending",
    Today => "today",
    Upcoming => "upcoming",
    Completed => "completed",
});

str_enum!(WeekStart {
    Sunday => "sunday",
    Monday => "monday",
});

impl Default for WeekStart {
    fn default() -> Self {
        Self::Sunday
    }
}
