//! Canonical subject registry and raw-header resolution.
//!
//! Uploaded gradebooks spell subject columns however the exporting school
//! pleases; reporting runs over the official curriculum list. Each official
//! subject carries a hand-authored rule (exact alternates plus Arabic
//! substring keywords) that binds it to at most one raw header.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    Arabic,
    Amazigh,
    Mathematics,
    French,
    English,
    IslamicEducation,
    HistoryGeography,
    CivicEducation,
    PhysicsTechnology,
    NaturalSciences,
    ArtEducation,
    MusicEducation,
    PhysicalEducation,
    ComputerScience,
    TermAverage,
}

/// Matching rule for one official subject: a raw header matches when it
/// equals one of `exact` or contains one of `keywords`. Keywords are
/// script-sensitive Arabic fragments; the only normalization applied to the
/// raw header is whitespace trimming.
#[derive(Debug, Clone, Copy)]
pub struct MatchRule {
    pub exact: &'static [&'static str],
    pub keywords: &'static [&'static str],
}

impl Subject {
    /// Official curriculum order. Drives report row order everywhere; never
    /// reordered based on data.
    pub const OFFICIAL_ORDER: [Subject; 15] = [
        Subject::Arabic,
        Subject::Amazigh,
        Subject::Mathematics,
        Subject::French,
        Subject::English,
        Subject::IslamicEducation,
        Subject::HistoryGeography,
        Subject::CivicEducation,
        Subject::PhysicsTechnology,
        Subject::NaturalSciences,
        Subject::ArtEducation,
        Subject::MusicEducation,
        Subject::PhysicalEducation,
        Subject::ComputerScience,
        Subject::TermAverage,
    ];

    /// The 14 teaching subjects, i.e. everything except the term average
    /// column.
    pub fn teaching_subjects() -> &'static [Subject] {
        &Self::OFFICIAL_ORDER[..14]
    }

    pub fn official_name(self) -> &'static str {
        match self {
            Subject::Arabic => "اللغة العربية",
            Subject::Amazigh => "اللغة الأمازيغية",
            Subject::Mathematics => "الرياضيات",
            Subject::French => "اللغة الفرنسية",
            Subject::English => "اللغة الإنجليزية",
            Subject::IslamicEducation => "التربية الإسلامية",
            Subject::HistoryGeography => "التاريخ والجغرافيا",
            Subject::CivicEducation => "التربية المدنية",
            Subject::PhysicsTechnology => "ع الفيزيائية والتكنولوجيا",
            Subject::NaturalSciences => "ع الطبيعة والحياة",
            Subject::ArtEducation => "التربية التشكيلية",
            Subject::MusicEducation => "التربية الموسيقية",
            Subject::PhysicalEducation => "ت البدنية والرياضية",
            Subject::ComputerScience => "المعلوماتية",
            Subject::TermAverage => "معدل الفصل 1",
        }
    }

    pub fn rule(self) -> MatchRule {
        match self {
            Subject::Arabic => MatchRule {
                exact: &["اللغة عربية"],
                keywords: &["العربية"],
            },
            Subject::Amazigh => MatchRule {
                exact: &[],
                keywords: &["الأمازيغية", "أمازيغية"],
            },
            Subject::Mathematics => MatchRule {
                exact: &["رياضيات"],
                keywords: &["الرياضيات"],
            },
            Subject::French => MatchRule {
                exact: &["لغة فرنسية"],
                keywords: &["الفرنسية"],
            },
            Subject::English => MatchRule {
                exact: &[],
                keywords: &["الإنجليزية", "انجليزية"],
            },
            Subject::IslamicEducation => MatchRule {
                exact: &["تربية إسلامية"],
                keywords: &["الإسلامية"],
            },
            Subject::HistoryGeography => MatchRule {
                exact: &[],
                keywords: &["التاريخ", "جغرافيا"],
            },
            Subject::CivicEducation => MatchRule {
                exact: &["تربية مدنية"],
                keywords: &["المدنية"],
            },
            Subject::PhysicsTechnology => MatchRule {
                exact: &[],
                keywords: &["فيزياء", "فيزيائية", "تكنولوجيا"],
            },
            Subject::NaturalSciences => MatchRule {
                exact: &[],
                keywords: &["طبيعة", "طبيعية", "الحياة"],
            },
            Subject::ArtEducation => MatchRule {
                exact: &[],
                keywords: &["تشكيلية"],
            },
            Subject::MusicEducation => MatchRule {
                exact: &[],
                keywords: &["موسيقية"],
            },
            Subject::PhysicalEducation => MatchRule {
                exact: &[],
                keywords: &["بدنية", "رياضية"],
            },
            Subject::ComputerScience => MatchRule {
                exact: &[],
                keywords: &["معلوماتية"],
            },
            Subject::TermAverage => MatchRule {
                exact: &[],
                keywords: &["معدل الفصل"],
            },
        }
    }

    /// Does `raw` (a verbatim spreadsheet header) satisfy this subject's
    /// rule?
    pub fn matches(self, raw: &str) -> bool {
        let r = raw.trim();
        let rule = self.rule();
        rule.exact.iter().any(|e| r == *e) || rule.keywords.iter().any(|k| r.contains(k))
    }

    /// Pick the raw header bound to this subject out of `labels`, or `None`
    /// when nothing matches.
    ///
    /// First match in the caller's iteration order wins. Resolution is
    /// therefore order-dependent by design: callers pass labels in
    /// discovery order and get the same binding on every call.
    pub fn resolve<'a, I>(self, labels: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        labels.into_iter().find(|raw| self.matches(raw))
    }
}
