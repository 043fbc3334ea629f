/// Common contract of the output drivers.
///
/// Drivers are built by their own `new` constructors, which either return a
/// fully running driver or release everything they acquired. Dropping a driver
/// performs the full teardown and never fails.
pub trait AudioDriver: Send + 'static {
    fn name(&self) -> &'static str;

    /// Whether the production mechanism is still delivering blocks.
    fn is_running(&self) -> bool;
}
