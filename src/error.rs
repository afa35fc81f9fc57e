use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Raised when too few active monitor positions are available to fit a flux surface
    #[error("not enough monitor positions. at least {required} required. currently only {active} active")]
    NotEnoughPositions { required: usize, active: usize },
    /// A preferred kind name that does not parse
    #[error("unknown preferred kind `{0}`")]
    UnknownPreferredKind(String),
    /// An error kind other than `SD`, `SEM` or `MSEM`
    #[error("unknown error kind `{0}`")]
    UnknownErrorKind(String),
    /// A preferred attribute name that does not parse
    #[error("unknown preferred attribute `{0}`")]
    UnknownPreferredAttr(String),
    /// An age-only kind, such as plateau or isochron, requested for another attribute
    #[error("preferred kind `{kind}` is not available for `{attr}`")]
    UnsupportedPreferredKind { attr: String, kind: String },
    /// A subgroup was applied with neither the analysis list nor an explicit group number
    #[error("must set items or gid")]
    MissingGroupId,
    /// An irradiation position outside the tray, holes are numbered from 1
    #[error("hole {0} is not in the tray geometry")]
    MissingHole(usize),
    /// Fewer observations than model coefficients
    #[error("regression requires at least {required} points, received {received}")]
    InsufficientData { required: usize, received: usize },
    /// Singular normal equations, or another LAPACK failure
    #[error(transparent)]
    Linalg(#[from] ndarray_linalg::error::LinalgError),
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn messages_name_the_offending_values() {
        let error = Error::UnsupportedPreferredKind {
            attr: "kca".to_owned(),
            kind: "Plateau".to_owned(),
        };
        assert_eq!(
            error.to_string(),
            "preferred kind `Plateau` is not available for `kca`"
        );
        assert_eq!(
            Error::MissingHole(42).to_string(),
            "hole 42 is not in the tray geometry"
        );
        assert_eq!(
            Error::InsufficientData {
                required: 3,
                received: 2
            }
            .to_string(),
            "regression requires at least 3 points, received 2"
        );
    }
}
