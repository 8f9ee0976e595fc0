use crate::error::{CdbError, Result};

/// The catalogue of CDB data kinds, keyed by a three-digit integer code.
///
/// Codes and names follow the upstream CDB dataset table; component
/// families (GSModel/GTModel/MModel) collapse their many sub-kinds
/// (geometry/texture/descriptor/material/CMT/...) into one variant each
/// since the builder treats them uniformly for tiling purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    MultipleContents,
    Elevation,
    MinMaxElevation,
    MaxCulture,
    Imagery,
    RMTexture,
    RMDescriptor,
    GSFeature,
    GTFeature,
    GeoPolitical,
    VectorMaterial,
    RoadNetwork,
    RailRoadNetwork,
    PowerlineNetwork,
    HydrographyNetwork,
    GSModel,
    GTModel,
    MModel,
    Metadata,
    ClientSpecific,
}

impl Dataset {
    /// The three-digit code used in filenames (`_D<ddd>_`) and directory names.
    pub fn code(self) -> u32 {
        match self {
            Dataset::MultipleContents => 0,
            Dataset::Elevation => 1,
            Dataset::MinMaxElevation => 2,
            Dataset::MaxCulture => 3,
            Dataset::Imagery => 4,
            Dataset::RMTexture => 5,
            Dataset::RMDescriptor => 6,
            Dataset::GSFeature => 100,
            Dataset::GTFeature => 101,
            Dataset::GeoPolitical => 102,
            Dataset::VectorMaterial => 200,
            Dataset::RoadNetwork => 201,
            Dataset::RailRoadNetwork => 202,
            Dataset::PowerlineNetwork => 203,
            Dataset::HydrographyNetwork => 204,
            Dataset::GSModel => 300,
            Dataset::GTModel => 500,
            Dataset::MModel => 600,
            Dataset::Metadata => 700,
            Dataset::ClientSpecific => 701,
        }
    }

    /// The name used in `NNN_Name` directory components.
    pub fn name(self) -> &'static str {
        match self {
            Dataset::MultipleContents => "MultipleContents",
            Dataset::Elevation => "Elevation",
            Dataset::MinMaxElevation => "MinMaxElevation",
            Dataset::MaxCulture => "MaxCulture",
            Dataset::Imagery => "Imagery",
            Dataset::RMTexture => "RMTexture",
            Dataset::RMDescriptor => "RMDescriptor",
            Dataset::GSFeature => "GSFeature",
            Dataset::GTFeature => "GTFeature",
            Dataset::GeoPolitical => "GeoPolitical",
            Dataset::VectorMaterial => "VectorMaterial",
            Dataset::RoadNetwork => "RoadNetwork",
            Dataset::RailRoadNetwork => "RailRoadNetwork",
            Dataset::PowerlineNetwork => "PowerlineNetwork",
            Dataset::HydrographyNetwork => "HydrographyNetwork",
            Dataset::GSModel => "GSModelGeometry",
            Dataset::GTModel => "GTModelGeometry",
            Dataset::MModel => "MModelGeometry",
            Dataset::Metadata => "Metadata",
            Dataset::ClientSpecific => "ClientSpecific",
        }
    }

    /// Directory component form: `NNN_Name`.
    pub fn directory_name(self) -> String {
        format!("{:03}_{}", self.code(), self.name())
    }

    /// Parse from a three-digit numeric code as found in `_D<ddd>_`.
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Dataset::MultipleContents,
            1 => Dataset::Elevation,
            2 => Dataset::MinMaxElevation,
            3 => Dataset::MaxCulture,
            4 => Dataset::Imagery,
            5 => Dataset::RMTexture,
            6 => Dataset::RMDescriptor,
            100 => Dataset::GSFeature,
            101 => Dataset::GTFeature,
            102 => Dataset::GeoPolitical,
            200 => Dataset::VectorMaterial,
            201 => Dataset::RoadNetwork,
            202 => Dataset::RailRoadNetwork,
            203 => Dataset::PowerlineNetwork,
            204 => Dataset::HydrographyNetwork,
            300..=312 => Dataset::GSModel,
            500..=513 => Dataset::GTModel,
            600..=606 => Dataset::MModel,
            700 => Dataset::Metadata,
            701 => Dataset::ClientSpecific,
            _ => return None,
        })
    }

    /// Parse from a case-sensitive dataset name (used by `--combine`). Unknown
    /// names are a fatal config error listing all valid names, per the CLI contract.
    pub fn from_name(name: &str) -> Result<Self> {
        const ALL: &[Dataset] = &[
            Dataset::MultipleContents,
            Dataset::Elevation,
            Dataset::MinMaxElevation,
            Dataset::MaxCulture,
            Dataset::Imagery,
            Dataset::RMTexture,
            Dataset::RMDescriptor,
            Dataset::GSFeature,
            Dataset::GTFeature,
            Dataset::GeoPolitical,
            Dataset::VectorMaterial,
            Dataset::RoadNetwork,
            Dataset::RailRoadNetwork,
            Dataset::PowerlineNetwork,
            Dataset::HydrographyNetwork,
            Dataset::GSModel,
            Dataset::GTModel,
            Dataset::MModel,
            Dataset::Metadata,
            Dataset::ClientSpecific,
        ];

        ALL.iter()
            .find(|d| d.name() == name)
            .copied()
            .ok_or_else(|| {
                let valid: Vec<&str> = ALL.iter().map(|d| d.name()).collect();
                CdbError::Config(format!(
                    "unknown dataset '{name}', expected one of: {}",
                    valid.join(", ")
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_round_trips_through_from_code() {
        for d in [
            Dataset::Elevation,
            Dataset::Imagery,
            Dataset::GSFeature,
            Dataset::RoadNetwork,
            Dataset::Metadata,
        ] {
            assert_eq!(Dataset::from_code(d.code()), Some(d));
        }
    }

    #[test]
    fn model_family_collapses_to_one_variant() {
        assert_eq!(Dataset::from_code(304), Some(Dataset::GSModel));
        assert_eq!(Dataset::from_code(511), Some(Dataset::GTModel));
        assert_eq!(Dataset::from_code(606), Some(Dataset::MModel));
    }

    #[test]
    fn unknown_code_is_none() {
        assert_eq!(Dataset::from_code(999), None);
    }

    #[test]
    fn directory_name_is_zero_padded() {
        assert_eq!(Dataset::Elevation.directory_name(), "001_Elevation");
        assert_eq!(Dataset::RoadNetwork.directory_name(), "201_RoadNetwork");
    }

    #[test]
    fn from_name_known() {
        assert_eq!(Dataset::from_name("Elevation").unwrap(), Dataset::Elevation);
    }

    #[test]
    fn from_name_unknown_lists_valid_names() {
        let err = Dataset::from_name("Nonsense").unwrap_err();
        assert!(err.to_string().contains("unknown dataset 'Nonsense'"));
        assert!(err.to_string().contains("Elevation"));
    }
}
