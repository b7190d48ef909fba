use num_complex::Complex;
use std::fmt;

/// Element type of an array, as far as the numerical routines care.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Complex64,
    Complex128,
}

impl DType {
    pub fn is_real_floating(self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }

    pub fn is_complex(self) -> bool {
        matches!(self, DType::Complex64 | DType::Complex128)
    }

    pub fn is_integer(self) -> bool {
        !self.is_real_floating() && !self.is_complex()
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::UInt8 => "uint8",
            DType::UInt16 => "uint16",
            DType::UInt32 => "uint32",
            DType::UInt64 => "uint64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Complex64 => "complex64",
            DType::Complex128 => "complex128",
        };
        f.write_str(name)
    }
}

/// Real scalar that can be sampled as a volume value.
///
/// All interpolation is carried out in `f64`; `from_f64` brings the result back,
/// rounding half away from zero and saturating for integer types.
pub trait Element: Copy + Send + Sync + 'static {
    const DTYPE: DType;

    fn to_f64(self) -> f64;

    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_float_element {
    ($t:ty, $dtype:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(value: f64) -> Self {
                value as $t
            }
        }
    };
}

macro_rules! impl_int_element {
    ($t:ty, $dtype:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;

            fn to_f64(self) -> f64 {
                self as f64
            }

            // `as` saturates out of range values and maps NaN to 0
            fn from_f64(value: f64) -> Self {
                value.round() as $t
            }
        }
    };
}

impl_float_element!(f32, DType::Float32);
impl_float_element!(f64, DType::Float64);
impl_int_element!(i8, DType::Int8);
impl_int_element!(i16, DType::Int16);
impl_int_element!(i32, DType::Int32);
impl_int_element!(i64, DType::Int64);
impl_int_element!(u8, DType::UInt8);
impl_int_element!(u16, DType::UInt16);
impl_int_element!(u32, DType::UInt32);
impl_int_element!(u64, DType::UInt64);

/// Scalar accepted by the frequency-domain routines: real floats and complex numbers.
pub trait Spectral: Copy + Send + Sync + 'static {
    const DTYPE: DType;

    fn to_complex(self) -> Complex<f64>;
}

impl Spectral for f32 {
    const DTYPE: DType = DType::Float32;

    fn to_complex(self) -> Complex<f64> {
        Complex::new(self as f64, 0.0)
    }
}

impl Spectral for f64 {
    const DTYPE: DType = DType::Float64;

    fn to_complex(self) -> Complex<f64> {
        Complex::new(self, 0.0)
    }
}

impl Spectral for Complex<f32> {
    const DTYPE: DType = DType::Complex64;

    fn to_complex(self) -> Complex<f64> {
        Complex::new(self.re as f64, self.im as f64)
    }
}

impl Spectral for Complex<f64> {
    const DTYPE: DType = DType::Complex128;

    fn to_complex(self) -> Complex<f64> {
        self
    }
}
