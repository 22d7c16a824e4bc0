use std::fmt::Display;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SGError
{
    /// Rule name or id not recognized during construction or deserialization.
    UnknownRule,
    /// The (depth, selection, rule) combination is not usable, e.g. an
    /// exactness-driven selection with a rule that has no exactness table.
    IncompatibleSelection,
    /// Anisotropic weight vector is not empty, `d` or `2d` long.
    InvalidAnisotropicWeights,
    /// `level_limits` was given but its length differs from the dimension.
    InvalidLevelLimits,
    /// A rule level beyond the tabulated range was requested.
    RuleLevelUnavailable,
    /// The custom rule table is shorter than the requested depth requires.
    CustomRuleTooShort,
    NumberOfPointsAndValuesMismatch,
    /// Values were supplied for a node that no pending tensor contains.
    UnknownConstructionPoint,
    /// Construction has not been started with `begin_construction`.
    ConstructionNotStarted,
    /// Refinement was requested before any values were loaded.
    NoValuesLoaded,
    /// Output index is out of range for this grid.
    InvalidOutput,
    /// The iterative sparse solve failed to reach its residual target.
    SparseSolveFailed,
    /// The least-squares solve of the anisotropy estimator failed.
    LeastSquaresFailed,
    ReadBufferFailed,
    WriteBufferFailed,
    TruncatedStream,
    SerializationFailed,
    DeserializationFailed,
    LZ4DecompressionFailed,
    FileIOError,
    InvalidIndex,
}
impl std::error::Error for SGError {}

impl Display for SGError
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", *self)
    }
}
