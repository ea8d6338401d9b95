mod common;
mod routing;
mod support;
