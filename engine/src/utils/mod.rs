pub mod error;
pub mod ode;
pub mod quadrature;
pub mod spline;
