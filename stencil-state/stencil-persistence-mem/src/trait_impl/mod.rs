mod base;
mod template;
