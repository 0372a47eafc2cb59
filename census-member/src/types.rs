//! Closed answer sets recorded on the member and checklist forms
//!
//! Every enumeration has a stable stored label (`as_str`) used both in the
//! database and in serialized output, and a lenient `from_str` for reading
//! it back.

macro_rules! labeled_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize,
        )]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $label)] $variant ),+
        }

        impl $name {
            /// Stored label
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $label ),+
                }
            }

            /// Parse a stored label (case-insensitive)
            pub fn from_str(s: &str) -> Option<Self> {
                let s = s.trim();
                $(
                    if s.eq_ignore_ascii_case($label) {
                        return Some($name::$variant);
                    }
                )+
                None
            }

            /// All variants in declaration order
            pub fn all_variants() -> &'static [$name] {
                &[ $( $name::$variant ),+ ]
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

labeled_enum! {
    /// Survival status reported at enumeration
    pub enum SurvivalStatus {
        Alive => "alive",
        Dead => "dead",
        Unknown => "unknown",
    }
}

labeled_enum! {
    pub enum Gender {
        Male => "M",
        Female => "F",
    }
}

labeled_enum! {
    /// Whether the member counts as a resident of the study community
    pub enum StudyResident {
        Yes => "Yes",
        No => "No",
        NotApplicable => "N/A",
        /// Does not want to answer
        Declined => "DWTA",
    }
}

labeled_enum! {
    /// Reason the member cannot take part; `NotApplicable` means none
    pub enum InabilityToParticipate {
        NotApplicable => "N/A",
        MentalIncapacity => "mental_incapacity",
        DeafMute => "deaf_mute",
        TooSick => "too_sick",
        Incarcerated => "incarcerated",
        Other => "other",
    }
}

labeled_enum! {
    /// Relation to the head of household
    pub enum Relation {
        Head => "head",
        Spouse => "spouse",
        Child => "child",
        Parent => "parent",
        Sibling => "sibling",
        Grandchild => "grandchild",
        OtherRelative => "other_relative",
        NotRelated => "not_related",
    }
}

labeled_enum! {
    pub enum YesNo {
        Yes => "Yes",
        No => "No",
    }
}

labeled_enum! {
    pub enum YesNoNa {
        Yes => "Yes",
        No => "No",
        NotApplicable => "N/A",
    }
}

labeled_enum! {
    /// Answer to "confirm participation" on the enrollment checklist
    pub enum ConfirmParticipation {
        NotApplicable => "N/A",
        Yes => "Yes",
        No => "No",
        /// Subject already completed the study; blocks re-enrollment
        Blocked => "block",
    }
}

pub(crate) use labeled_enum;
