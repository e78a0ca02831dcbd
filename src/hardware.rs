pub mod afe_dac;
