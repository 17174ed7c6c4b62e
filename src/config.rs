//! Types for one-time configuration of a map instance's table parameters.

const DEFAULT_INITIAL_CAPACITY: usize = 16;
const DEFAULT_LOAD_FACTOR: u32 = 75;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Config
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Table parameters fixed at map construction.
#[derive(Copy, Clone, Debug)]
pub struct Config {
    initial_capacity: usize,
    load_factor: u32,
}

/********** impl Default **************************************************************************/

impl Default for Config {
    #[inline]
    fn default() -> Self {
        ConfigBuilder::new().build()
    }
}

/********** impl inherent *************************************************************************/

impl Config {
    /// Creates a new [`Config`] with the given parameters.
    ///
    /// # Panics
    ///
    /// This function panics, if `initial_capacity` is not a non-zero power of
    /// two or if `load_factor` is not a percentage in the range `1..=100`.
    #[inline]
    pub fn with_params(initial_capacity: usize, load_factor: u32) -> Self {
        assert!(initial_capacity.is_power_of_two(), "initial capacity must be a power of two");
        assert!(
            load_factor >= 1 && load_factor <= 100,
            "load factor must be a percentage between 1 and 100"
        );
        Self { initial_capacity, load_factor }
    }

    /// Returns the number of buckets the map starts out with.
    #[inline]
    pub fn initial_capacity(&self) -> usize {
        self.initial_capacity
    }

    /// Returns the load factor percentage above which the bucket count is
    /// doubled.
    #[inline]
    pub fn load_factor(&self) -> u32 {
        self.load_factor
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ConfigBuilder
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A builder type for gradually initializing a [`Config`].
#[derive(Copy, Clone, Debug, Default)]
pub struct ConfigBuilder {
    initial_capacity: Option<usize>,
    load_factor: Option<u32>,
}

/********** impl inherent *************************************************************************/

impl ConfigBuilder {
    /// Creates a new [`ConfigBuilder`] with default values.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial number of buckets (must be a power of two).
    #[inline]
    pub fn initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = Some(initial_capacity);
        self
    }

    /// Sets the load factor percentage above which the map doubles its bucket
    /// count.
    #[inline]
    pub fn load_factor(mut self, load_factor: u32) -> Self {
        self.load_factor = Some(load_factor);
        self
    }

    /// Consumes the [`ConfigBuilder`] and returns an initialized [`Config`].
    ///
    /// Unspecified parameters are initialized with their default values.
    #[inline]
    pub fn build(self) -> Config {
        Config::with_params(
            self.initial_capacity.unwrap_or(DEFAULT_INITIAL_CAPACITY),
            self.load_factor.unwrap_or(DEFAULT_LOAD_FACTOR),
        )
    }
}
