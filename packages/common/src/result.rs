use crate::error::CommonError;

pub type CommonResult<T> = Result<T, CommonError>;
