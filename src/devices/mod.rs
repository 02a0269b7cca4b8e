// Keysight InfiniiVision 2000 X-Series oscilloscopes. Other instruments get their own module here, driven
// through the same Transport.
pub mod infiniivision;
